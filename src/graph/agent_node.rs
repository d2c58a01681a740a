//! 领域 Agent 节点
//!
//! 把系统提示词、对话与本 Agent 的工具定义交给模型，要求二选一：一批工具调用，或一个结构化最终回答。
//! - 工具调用：逐个校验工具名，有不存在的工具时写入系统提示并回到 Supervisor
//! - 最终回答：写入带 Agent 标记的 assistant 消息与元数据，交给 Reflection
//! - 两者都没有、或模型调用失败：给出一条降级回复并结束本轮，不向外抛错

use std::sync::Arc;

use crate::core::{AgentError, AgentKind, ConversationState, Next, ResponseMetadata, StateUpdate};
use crate::graph::schema::{answer_format, AgentAnswer};
use crate::llm::{CompletionRequest, LlmClient, StructuredOutput, ToolSpec};
use crate::memory::Message;
use crate::tools::ToolRegistry;

pub struct AgentNode {
    kind: AgentKind,
    llm: Arc<dyn LlmClient>,
    prompt: String,
    registry: ToolRegistry,
    tools: Vec<ToolSpec>,
    format: StructuredOutput,
}

impl AgentNode {
    pub fn new(
        kind: AgentKind,
        llm: Arc<dyn LlmClient>,
        prompt: impl Into<String>,
        registry: ToolRegistry,
    ) -> Self {
        let tools = registry.specs();
        Self {
            kind,
            llm,
            prompt: prompt.into(),
            registry,
            tools,
            format: answer_format(),
        }
    }

    pub async fn run(&self, state: &ConversationState) -> StateUpdate {
        tracing::info!(agent = %self.kind, "Entering agent");
        match self.invoke(&state.messages).await {
            Ok(update) => update,
            Err(AgentError::InvalidToolReference(name)) => {
                let note = format!("Invalid tool: {name}, try another agent.");
                tracing::warn!(agent = %self.kind, "{}", note);
                StateUpdate::goto(Next::Supervisor)
                    .with_message(Message::system(note))
                    .with_metadata(ResponseMetadata::default())
            }
            Err(e) => {
                tracing::error!(agent = %self.kind, "Error during agent invoke: {}", e);
                self.degraded(e.describe())
            }
        }
    }

    fn degraded(&self, reply: String) -> StateUpdate {
        StateUpdate::goto(Next::End)
            .with_message(Message::assistant(reply).from_agent(self.kind))
            .with_metadata(ResponseMetadata::default())
    }

    async fn invoke(&self, messages: &[Message]) -> Result<StateUpdate, AgentError> {
        let request = CompletionRequest::new(&self.prompt, messages)
            .with_tools(&self.tools)
            .with_format(&self.format);
        let completion = self.llm.complete(request).await?;

        if completion.has_tool_calls() {
            if let Some(bad) = completion
                .tool_calls
                .iter()
                .find(|call| !self.registry.contains(&call.name))
            {
                return Err(AgentError::InvalidToolReference(bad.name.clone()));
            }
            // 同时带有结构化回答时，以回答文本作为该消息内容
            let content = completion
                .parse_structured::<AgentAnswer>()
                .map(|a| a.answer)
                .unwrap_or_else(|_| completion.content.clone().unwrap_or_default());
            let issued = completion.tool_calls.len() as u64;
            tracing::info!(agent = %self.kind, "Issuing {} tool calls", issued);
            let mut update = StateUpdate::goto(Next::Tools(self.kind))
                .with_message(Message::tool_request(content, completion.tool_calls).from_agent(self.kind))
                .with_metadata(ResponseMetadata::default());
            update.tool_calls_issued = issued;
            return Ok(update);
        }

        let answer: AgentAnswer = completion
            .parse_structured()
            .map_err(|e| AgentError::AgentProtocolViolation(e.to_string()))?;
        Ok(StateUpdate::goto(Next::Reflection(self.kind))
            .with_message(Message::assistant(answer.answer).from_agent(self.kind))
            .with_metadata(answer.metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, LlmError, ScriptedLlmClient};
    use crate::memory::{Role, ToolCallRequest};
    use crate::tools::{Tool, ToolError};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct ListPrs;

    #[async_trait]
    impl Tool for ListPrs {
        fn name(&self) -> &str {
            "list_pull_requests"
        }
        fn description(&self) -> &str {
            "List pull requests"
        }
        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Ok("[]".into())
        }
    }

    fn node(llm: Arc<ScriptedLlmClient>) -> AgentNode {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ListPrs)).unwrap();
        AgentNode::new(AgentKind::Github, llm, "github prompt", registry)
    }

    fn state() -> ConversationState {
        let mut state = ConversationState::default();
        state.messages.push(Message::user("list PRs"));
        state
    }

    #[tokio::test]
    async fn test_valid_tool_calls_go_to_tools() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_ok(Completion::tool_calls(vec![ToolCallRequest::new(
            "list_pull_requests",
            json!({"repo": "x"}),
        )]));
        let update = node(llm.clone()).run(&state()).await;
        assert_eq!(update.next, Some(Next::Tools(AgentKind::Github)));
        assert_eq!(update.tool_calls_issued, 1);
        assert!(update.messages[0].has_tool_calls());
        assert_eq!(llm.requests()[0].tool_names, vec!["list_pull_requests"]);
    }

    #[tokio::test]
    async fn test_hallucinated_tool_returns_to_supervisor() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_ok(Completion::tool_calls(vec![
            ToolCallRequest::new("list_pull_requests", json!({})),
            ToolCallRequest::new("delete_everything", json!({})),
        ]));
        let update = node(llm).run(&state()).await;
        assert_eq!(update.next, Some(Next::Supervisor));
        assert_eq!(update.messages.len(), 1);
        assert_eq!(update.messages[0].role, Role::System);
        assert_eq!(
            update.messages[0].content,
            "Invalid tool: delete_everything, try another agent."
        );
        assert_eq!(update.tool_calls_issued, 0);
    }

    #[tokio::test]
    async fn test_structured_answer_goes_to_reflection() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_ok(Completion::structured(&json!({
            "answer": "No open PRs",
            "metadata": {"requires_user_input": false, "input_fields": []}
        })));
        let update = node(llm).run(&state()).await;
        assert_eq!(update.next, Some(Next::Reflection(AgentKind::Github)));
        assert!(update.messages[0].is_final_answer());
        assert_eq!(update.messages[0].content, "No open PRs");
    }

    #[tokio::test]
    async fn test_empty_response_is_protocol_violation() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_ok(Completion::default());
        let update = node(llm).run(&state()).await;
        assert_eq!(update.next, Some(Next::End));
        assert!(update.messages[0]
            .content
            .starts_with("AgentProtocolViolation:"));
    }

    #[tokio::test]
    async fn test_model_error_degrades() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push(Err(LlmError::Api("bad request".into())));
        let update = node(llm).run(&state()).await;
        assert_eq!(update.next, Some(Next::End));
        assert_eq!(update.messages[0].role, Role::Assistant);
        assert!(update.messages[0].content.contains("bad request"));
    }
}
