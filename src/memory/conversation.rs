//! 对话消息
//!
//! 每条消息有稳定 id（裁剪时按 id 下发删除指令）；assistant 消息可携带 tool call 请求，
//! tool 消息通过 tool_call_id 关联到发起它的请求。

use serde::{Deserialize, Serialize};

use crate::core::AgentKind;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 模型发出的单个工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// 产生该消息的 Agent（仅 Agent 节点写入的 assistant 消息有值）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentKind>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            agent: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// assistant 消息，携带一批工具调用请求
    pub fn tool_request(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_calls = calls;
        msg
    }

    /// 工具结果消息，tool_call_id 指向发起它的请求
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = Some(call_id.into());
        msg
    }

    pub fn from_agent(mut self, agent: AgentKind) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }

    /// Agent 的最终回答：assistant、无工具调用、且带 Agent 标记
    pub fn is_final_answer(&self) -> bool {
        self.role == Role::Assistant && self.tool_calls.is_empty() && self.agent.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_links_call() {
        let call = ToolCallRequest::new("list_pull_requests", serde_json::json!({}));
        let req = Message::tool_request("", vec![call.clone()]);
        let res = Message::tool_result(&call.id, "[]");
        assert!(req.has_tool_calls());
        assert!(res.is_tool_result());
        assert_eq!(res.tool_call_id.as_deref(), Some(call.id.as_str()));
        assert_ne!(req.id, res.id);
    }

    #[test]
    fn test_final_answer_requires_agent_tag() {
        assert!(!Message::assistant("hi").is_final_answer());
        assert!(Message::assistant("hi")
            .from_agent(AgentKind::Github)
            .is_final_answer());
        let call = ToolCallRequest::new("x", serde_json::Value::Null);
        assert!(!Message::tool_request("", vec![call])
            .from_agent(AgentKind::Github)
            .is_final_answer());
    }
}
