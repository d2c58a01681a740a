//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! - MockLlmClient：按结构化输出名称给出确定性回答，Supervisor 用关键词路由
//! - ScriptedLlmClient：按顺序返回预先排好的输出，并记录每次请求，供集成测试断言

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：不发起工具调用，直接基于最后一条用户消息作答
#[derive(Debug, Default)]
pub struct MockLlmClient;

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

/// 关键词路由，返回 RouteAction 的线上名称
fn route_by_keywords(text: &str) -> &'static str {
    let text = text.to_lowercase();
    let rules: [(&[&str], &str); 5] = [
        (&["argocd", "deploy"][..], "argocd"),
        (&["on-call", "oncall", "pagerduty"][..], "pagerduty"),
        (&["jira", "ticket", "jql"][..], "jira"),
        (&["backstage", "catalog", "group", "project"][..], "backstage"),
        (&["github", "pull request", "repo", " ci", "workflow"][..], "github"),
    ];
    rules
        .iter()
        .find(|(words, _)| words.iter().any(|w| text.contains(w)))
        .map(|(_, route)| *route)
        .unwrap_or("what can you do")
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
        let question = last_user(request.messages);
        let value = match request.response_format.map(|f| f.name.as_str()) {
            Some("SupervisorAction") => json!({ "action": route_by_keywords(question) }),
            Some("ShouldContinue") => json!({
                "should_continue": false,
                "reason": "Mock: the answer addresses the question."
            }),
            Some(_) => json!({
                "answer": format!("Mock answer for: {question}"),
                "metadata": { "requires_user_input": false, "input_fields": [] }
            }),
            None => return Ok(Completion::text(format!("Echo from Mock: {question}"))),
        };
        Ok(Completion::structured(&value))
    }
}

/// 记录下来的一次请求
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    pub format_name: Option<String>,
}

/// 脚本化客户端：按入队顺序返回输出；脚本耗尽时返回错误
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, output: Result<Completion, LlmError>) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(output);
        self
    }

    pub fn push_ok(&self, completion: Completion) -> &Self {
        self.push(Ok(completion))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                system_prompt: request.system_prompt.to_string(),
                messages: request.messages.to_vec(),
                tool_names: request
                    .tools
                    .unwrap_or_default()
                    .iter()
                    .map(|t| t.name.clone())
                    .collect(),
                format_name: request.response_format.map(|f| f.name.clone()),
            });
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::NotConfigured("script exhausted".to_string())))
    }
}
