//! Reflection 节点
//!
//! Agent 给出最终回答后判断本轮是否继续：继续则回到 Supervisor，否则结束。
//! 两个护栏在调用模型前短路：
//! - 最新元数据要求用户输入
//! - 同一 Agent 在本轮内连续给出相同回答

use std::sync::Arc;

use crate::core::{AgentError, AgentKind, ConversationState, Next, ResponseMetadata, StateUpdate};
use crate::graph::schema::{reflection_format, ShouldContinue};
use crate::llm::{CompletionRequest, LlmClient, StructuredOutput};
use crate::memory::Message;

pub struct ReflectionNode {
    llm: Arc<dyn LlmClient>,
    prompt: String,
    format: StructuredOutput,
}

/// 护栏：返回停止理由，None 表示需要交给模型判断
pub fn guard(kind: AgentKind, state: &ConversationState) -> Option<String> {
    if state
        .latest_metadata()
        .map_or(false, |m| m.requires_user_input)
    {
        return Some("User input required; waiting for the user.".to_string());
    }

    let mut answers = state
        .current_turn()
        .iter()
        .rev()
        .filter(|m| m.is_final_answer() && m.agent == Some(kind));
    match (answers.next(), answers.next()) {
        (Some(latest), Some(previous)) if latest.content == previous.content => Some(format!(
            "{} repeated its previous answer; stopping.",
            kind.display_name()
        )),
        _ => None,
    }
}

impl ReflectionNode {
    pub fn new(llm: Arc<dyn LlmClient>, prompt: impl Into<String>) -> Self {
        Self {
            llm,
            prompt: prompt.into(),
            format: reflection_format(),
        }
    }

    pub async fn run(&self, kind: AgentKind, state: &ConversationState) -> StateUpdate {
        tracing::info!(agent = %kind, "Entering reflection");
        if let Some(reason) = guard(kind, state) {
            tracing::info!(agent = %kind, "Reflection short-circuit: {}", reason);
            return Self::stop(reason);
        }

        match self.judge(&state.messages).await {
            Ok(verdict) => {
                tracing::info!(
                    agent = %kind,
                    should_continue = verdict.should_continue,
                    "Reflection: {}",
                    verdict.reason
                );
                let next = if verdict.should_continue {
                    Next::Supervisor
                } else {
                    Next::End
                };
                let mut update = StateUpdate::goto(next)
                    .with_message(Message::system(verdict.reason))
                    .with_metadata(ResponseMetadata::default());
                update.continued = verdict.should_continue;
                update
            }
            // 反思失败时倾向停止而不是继续循环
            Err(e) => {
                tracing::error!(agent = %kind, "{}", e);
                Self::stop(e.describe())
            }
        }
    }

    fn stop(reason: String) -> StateUpdate {
        StateUpdate::goto(Next::End)
            .with_message(Message::system(reason))
            .with_metadata(ResponseMetadata::default())
    }

    async fn judge(&self, messages: &[Message]) -> Result<ShouldContinue, AgentError> {
        let completion = self
            .llm
            .complete(CompletionRequest::new(&self.prompt, messages).with_format(&self.format))
            .await
            .map_err(|e| AgentError::ReflectionFailure(e.to_string()))?;
        completion
            .parse_structured()
            .map_err(|e| AgentError::ReflectionFailure(e.to_string()))
    }
}
