//! Supervisor 节点
//!
//! 每轮的唯一入口：先裁剪历史（产出删除指令），再用裁剪后的窗口让模型在固定动作集中选一个路由。
//! 路由调用失败时兜底到「what can you do」，不阻塞本轮。

use std::sync::Arc;

use crate::core::{AgentError, ConversationState, RoutingDecision, StateUpdate};
use crate::graph::schema::{supervisor_format, SupervisorAction};
use crate::llm::{CompletionRequest, LlmClient, StructuredOutput};
use crate::memory::{HistoryTrimmer, Message};

pub struct SupervisorNode {
    llm: Arc<dyn LlmClient>,
    prompt: String,
    trimmer: HistoryTrimmer,
    format: StructuredOutput,
}

impl SupervisorNode {
    pub fn new(llm: Arc<dyn LlmClient>, prompt: impl Into<String>, trimmer: HistoryTrimmer) -> Self {
        Self {
            llm,
            prompt: prompt.into(),
            trimmer,
            format: supervisor_format(),
        }
    }

    pub async fn run(&self, state: &ConversationState) -> StateUpdate {
        tracing::info!("Entering supervisor agent");
        let removals = self.trimmer.removals(&state.messages);
        if !removals.is_empty() {
            tracing::debug!("Trimming {} messages from history", removals.len());
        }
        let window = self.trimmer.retained(&state.messages);

        let decision = self.route(window).await.unwrap_or_else(|e| {
            tracing::warn!("{}; falling back to 'what can you do'", e);
            RoutingDecision::WhatCanYouDo
        });
        tracing::info!(?decision, "Supervisor routing decision");
        StateUpdate::goto(decision.into()).with_removals(removals)
    }

    async fn route(&self, window: &[Message]) -> Result<RoutingDecision, AgentError> {
        let completion = self
            .llm
            .complete(CompletionRequest::new(&self.prompt, window).with_format(&self.format))
            .await
            .map_err(|e| AgentError::RoutingFailure(e.to_string()))?;
        let action: SupervisorAction = completion
            .parse_structured()
            .map_err(|e| AgentError::RoutingFailure(e.to_string()))?;
        Ok(action.action.into())
    }
}
