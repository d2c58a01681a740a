//! 历史裁剪
//!
//! 每次进入 Supervisor 前保留最近 max_messages 条消息。若边界落在 tool 结果上，
//! 向前扩展到发起该调用的 assistant 消息，保证 tool call / tool result 不被拆开。
//! 裁剪不原地修改历史，而是产出按 id 的删除指令，由状态统一应用。

use serde::{Deserialize, Serialize};

use crate::memory::Message;

/// 删除指令：按消息 id 移除
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMessage {
    pub id: String,
}

/// 历史窗口裁剪器
#[derive(Clone, Copy, Debug)]
pub struct HistoryTrimmer {
    max_messages: usize,
}

impl HistoryTrimmer {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
        }
    }

    /// 第一条保留消息的下标
    pub fn boundary(&self, messages: &[Message]) -> usize {
        if messages.len() <= self.max_messages {
            return 0;
        }
        let mut start = messages.len() - self.max_messages;
        // 一批调用可能对应多条 tool 结果，一直退到发起调用的那条消息
        while start > 0 && messages[start].is_tool_result() {
            start -= 1;
        }
        start
    }

    /// 裁剪后保留的窗口（供 Supervisor 发给模型）
    pub fn retained<'a>(&self, messages: &'a [Message]) -> &'a [Message] {
        &messages[self.boundary(messages)..]
    }

    /// 边界之前所有消息的删除指令
    pub fn removals(&self, messages: &[Message]) -> Vec<RemoveMessage> {
        messages[..self.boundary(messages)]
            .iter()
            .map(|m| RemoveMessage { id: m.id.clone() })
            .collect()
    }
}

impl Default for HistoryTrimmer {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCallRequest;

    fn apply(messages: &[Message], removals: &[RemoveMessage]) -> Vec<Message> {
        messages
            .iter()
            .filter(|m| !removals.iter().any(|r| r.id == m.id))
            .cloned()
            .collect()
    }

    fn tool_pair() -> (Message, Message) {
        let call = ToolCallRequest::new("list_pull_requests", serde_json::json!({}));
        let result = Message::tool_result(&call.id, "[]");
        (Message::tool_request("", vec![call]), result)
    }

    #[test]
    fn test_short_history_untouched() {
        let msgs = vec![Message::user("a"), Message::assistant("b")];
        assert!(HistoryTrimmer::new(20).removals(&msgs).is_empty());
    }

    #[test]
    fn test_keeps_most_recent() {
        let msgs: Vec<Message> = (0..5).map(|i| Message::user(i.to_string())).collect();
        let trimmer = HistoryTrimmer::new(3);
        let removals = trimmer.removals(&msgs);
        assert_eq!(removals.len(), 2);
        let kept = apply(&msgs, &removals);
        assert_eq!(kept[0].content, "2");
    }

    #[test]
    fn test_boundary_on_tool_result_extends_backward() {
        let (call, result) = tool_pair();
        let msgs = vec![
            Message::user("u1"),
            Message::assistant("a1"),
            call.clone(),
            result.clone(),
            Message::assistant("a2"),
            Message::user("u2"),
        ];
        let trimmer = HistoryTrimmer::new(3);
        assert_eq!(trimmer.boundary(&msgs), 2);
        let kept = apply(&msgs, &trimmer.removals(&msgs));
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].id, call.id);
        assert_eq!(kept[1].id, result.id);
    }

    #[test]
    fn test_batch_of_results_walks_to_request() {
        let a = ToolCallRequest::new("t1", serde_json::json!({}));
        let b = ToolCallRequest::new("t2", serde_json::json!({}));
        let msgs = vec![
            Message::user("u"),
            Message::tool_request("", vec![a.clone(), b.clone()]),
            Message::tool_result(&a.id, "1"),
            Message::tool_result(&b.id, "2"),
            Message::assistant("done"),
        ];
        assert_eq!(HistoryTrimmer::new(2).boundary(&msgs), 1);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let (call, result) = tool_pair();
        let msgs = vec![
            Message::user("u1"),
            call,
            result,
            Message::assistant("a"),
            Message::user("u2"),
        ];
        let trimmer = HistoryTrimmer::new(3);
        let once = apply(&msgs, &trimmer.removals(&msgs));
        assert!(trimmer.removals(&once).is_empty());
    }
}
