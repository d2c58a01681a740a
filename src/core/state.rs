//! 会话状态与节点产出的声明式更新
//!
//! ConversationState 归属于一次编排运行（一个 thread），只由图中的节点通过 StateUpdate 修改；
//! 按 thread_id 由 Checkpointer 持久化，跨轮延续。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::Next;
use crate::memory::{Message, RemoveMessage};

/// 需要用户补充的一个输入项
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InputField {
    /// 字段名
    pub name: String,
    /// 字段含义及用途
    pub description: String,
    /// 可选取值（为空表示自由输入）
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

/// Agent 回答附带的元数据
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseMetadata {
    /// 回答是否在等待用户输入
    pub requires_user_input: bool,
    #[serde(default)]
    pub input_fields: Vec<InputField>,
}

/// 会话级计数器
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// 累计发出的工具调用数
    pub tool_calls: u64,
    /// 已处理的用户轮次
    pub turns: u64,
    /// Reflection 判定继续的次数
    pub times_continued: u64,
}

/// 单个 thread 的完整状态
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub next: Next,
    /// 最新的在末尾
    pub metadata: Vec<ResponseMetadata>,
    pub counters: SessionCounters,
}

impl ConversationState {
    /// 应用一个节点的更新：先删除、再追加消息与元数据、最后设置下一跳
    pub fn apply(&mut self, update: StateUpdate) {
        if !update.remove.is_empty() {
            self.messages
                .retain(|m| !update.remove.iter().any(|r| r.id == m.id));
        }
        self.messages.extend(update.messages);
        self.metadata.extend(update.metadata);
        // 元数据条数不超过消息条数
        if self.metadata.len() > self.messages.len() {
            let excess = self.metadata.len() - self.messages.len();
            self.metadata.drain(..excess);
        }
        self.counters.tool_calls += update.tool_calls_issued;
        if update.continued {
            self.counters.times_continued += 1;
        }
        if let Some(next) = update.next {
            self.next = next;
        }
    }

    pub fn latest_metadata(&self) -> Option<&ResponseMetadata> {
        self.metadata.last()
    }

    /// 从最新一条用户消息起的本轮消息
    pub fn current_turn(&self) -> &[Message] {
        let start = self
            .messages
            .iter()
            .rposition(|m| m.role == crate::memory::Role::User)
            .unwrap_or(0);
        &self.messages[start..]
    }

    /// 上一轮因步数上限停在 Agent 与 Tools 之间时，为未执行的调用补上错误结果，
    /// 保证发给模型的历史中每个 tool call 都有对应结果
    pub fn close_dangling_tool_calls(&mut self) -> usize {
        let Some(last) = self.messages.last() else {
            return 0;
        };
        if !last.has_tool_calls() {
            return 0;
        }
        let results: Vec<Message> = last
            .tool_calls
            .iter()
            .map(|call| {
                Message::tool_result(
                    &call.id,
                    format!("Error: tool call {} was not executed", call.name),
                )
            })
            .collect();
        let n = results.len();
        self.messages.extend(results);
        n
    }
}

/// 节点的声明式产出；节点只读旧状态快照，更新由编排器统一应用
#[derive(Clone, Debug, Default)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub remove: Vec<RemoveMessage>,
    pub metadata: Vec<ResponseMetadata>,
    pub next: Option<Next>,
    pub tool_calls_issued: u64,
    pub continued: bool,
}

impl StateUpdate {
    pub fn goto(next: Next) -> Self {
        Self {
            next: Some(next),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
        self.metadata.push(metadata);
        self
    }

    pub fn with_removals(mut self, remove: Vec<RemoveMessage>) -> Self {
        self.remove = remove;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentKind;
    use crate::memory::ToolCallRequest;

    #[test]
    fn test_apply_removes_then_appends() {
        let mut state = ConversationState::default();
        state.apply(StateUpdate::goto(Next::Supervisor).with_message(Message::user("old")));
        let old_id = state.messages[0].id.clone();
        state.apply(
            StateUpdate::goto(Next::Agent(AgentKind::Github))
                .with_removals(vec![RemoveMessage { id: old_id }])
                .with_message(Message::user("new")),
        );
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "new");
        assert_eq!(state.next, Next::Agent(AgentKind::Github));
    }

    #[test]
    fn test_metadata_never_exceeds_messages() {
        let mut state = ConversationState::default();
        state.apply(
            StateUpdate::default()
                .with_message(Message::user("q"))
                .with_metadata(ResponseMetadata::default())
                .with_metadata(ResponseMetadata {
                    requires_user_input: true,
                    input_fields: vec![],
                }),
        );
        assert_eq!(state.metadata.len(), 1);
        assert!(state.latest_metadata().unwrap().requires_user_input);
    }

    #[test]
    fn test_close_dangling_tool_calls() {
        let mut state = ConversationState::default();
        let call = ToolCallRequest::new("retrieve_ci_logs", serde_json::json!({}));
        state.messages.push(Message::tool_request("", vec![call.clone()]));
        assert_eq!(state.close_dangling_tool_calls(), 1);
        let last = state.messages.last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some(call.id.as_str()));
        assert_eq!(state.close_dangling_tool_calls(), 0);
    }

    #[test]
    fn test_current_turn_starts_at_last_user() {
        let mut state = ConversationState::default();
        state.messages.push(Message::user("first"));
        state.messages.push(Message::assistant("a"));
        state.messages.push(Message::user("second"));
        state.messages.push(Message::assistant("b"));
        let turn = state.current_turn();
        assert_eq!(turn.len(), 2);
        assert_eq!(turn[0].content, "second");
    }
}
