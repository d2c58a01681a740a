//! 「what can you do」节点：用 Supervisor 提示词（含全部能力说明）直接回答，然后结束本轮

use std::sync::Arc;

use crate::core::{ConversationState, Next, ResponseMetadata, StateUpdate};
use crate::graph::schema::{answer_format, AgentAnswer};
use crate::llm::{CompletionRequest, LlmClient, LlmError, StructuredOutput};
use crate::memory::Message;

pub struct WhatCanYouDoNode {
    llm: Arc<dyn LlmClient>,
    prompt: String,
    format: StructuredOutput,
}

impl WhatCanYouDoNode {
    pub fn new(llm: Arc<dyn LlmClient>, prompt: impl Into<String>) -> Self {
        Self {
            llm,
            prompt: prompt.into(),
            format: answer_format(),
        }
    }

    pub async fn run(&self, state: &ConversationState) -> StateUpdate {
        tracing::info!("Entering what can you do");
        match self.answer(&state.messages).await {
            Ok(answer) => StateUpdate::goto(Next::End)
                .with_message(Message::assistant(answer.answer))
                .with_metadata(answer.metadata),
            Err(e) => {
                tracing::error!("Error during what can you do: {}", e);
                StateUpdate::goto(Next::End)
                    .with_message(Message::assistant(format!("ModelError: {e}")))
                    .with_metadata(ResponseMetadata::default())
            }
        }
    }

    async fn answer(&self, messages: &[Message]) -> Result<AgentAnswer, LlmError> {
        self.llm
            .complete(CompletionRequest::new(&self.prompt, messages).with_format(&self.format))
            .await?
            .parse_structured()
    }
}
