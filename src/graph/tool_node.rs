//! 工具执行节点
//!
//! 执行最新 assistant 消息上的全部工具调用（在产生它的 Agent 的注册表中查找），
//! 每个调用追加一条 tool 结果消息，然后无条件回到同一个 Agent。

use crate::core::{AgentError, AgentKind, ConversationState, Next, StateUpdate};
use crate::tools::ToolExecutor;

pub struct ToolNode {
    executor: ToolExecutor,
}

impl ToolNode {
    pub fn new(executor: ToolExecutor) -> Self {
        Self { executor }
    }

    pub async fn run(
        &self,
        kind: AgentKind,
        state: &ConversationState,
    ) -> Result<StateUpdate, AgentError> {
        let request = state
            .messages
            .last()
            .filter(|m| m.has_tool_calls())
            .ok_or(AgentError::MissingToolCalls)?;
        tracing::info!(agent = %kind, "Executing {} tool calls", request.tool_calls.len());
        let results = self.executor.execute_batch(&request.tool_calls).await;
        Ok(StateUpdate {
            messages: results,
            next: Some(Next::Agent(kind)),
            ..Default::default()
        })
    }
}
