//! 历史裁剪的端到端测试：Supervisor 只看到最近的窗口，且 tool call / tool result 不被拆开

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use jarvis::config::AppConfig;
use jarvis::core::AgentKind;
use jarvis::graph::Prompts;
use jarvis::llm::{Completion, ScriptedLlmClient};
use jarvis::memory::{HistoryTrimmer, MemoryCheckpointer, Message, ToolCallRequest};
use jarvis::tools::{Tool, ToolError, ToolRegistry};
use jarvis::OrchestratorBuilder;
use serde_json::{json, Value};

struct Topics;

#[async_trait]
impl Tool for Topics {
    fn name(&self) -> &str {
        "get_repo_topics"
    }
    fn description(&self) -> &str {
        "List repository topics"
    }
    async fn execute(&self, _args: Value) -> Result<String, ToolError> {
        Ok(r#"["rust","sre"]"#.to_string())
    }
}

/// 每个 tool 结果都能在它之前找到发起它的请求
fn assert_pairs_intact(messages: &[Message]) {
    let mut issued = HashSet::new();
    for m in messages {
        for call in &m.tool_calls {
            issued.insert(call.id.clone());
        }
        if let Some(id) = &m.tool_call_id {
            assert!(issued.contains(id), "orphaned tool result {id}");
        }
    }
}

#[tokio::test]
async fn test_supervisor_window_keeps_tool_pair() {
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.push_ok(Completion::structured(&json!({ "action": "github" })));
    llm.push_ok(Completion::tool_calls(vec![ToolCallRequest::new(
        "get_repo_topics",
        json!({ "repo_name": "org/svc" }),
    )]));
    llm.push_ok(Completion::structured(&json!({
        "answer": "Topics: rust, sre",
        "metadata": { "requires_user_input": false, "input_fields": [] }
    })));
    llm.push_ok(Completion::structured(
        &json!({ "should_continue": false, "reason": "done" }),
    ));

    let mut cfg = AppConfig::default();
    cfg.app.prompts_dir = None;
    cfg.graph.max_messages = 4;
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(Topics)).unwrap();
    let orchestrator = Arc::new(
        OrchestratorBuilder::new(cfg)
            .with_llm(llm.clone())
            .with_checkpointer(Arc::new(MemoryCheckpointer::new()))
            .with_prompts(Prompts::default())
            .with_registry(AgentKind::Github, registry)
            .build()
            .unwrap(),
    );

    orchestrator
        .interact_collect("first question: topics of org/svc", "trim")
        .await
        .unwrap();
    // user, tool request, tool result, answer, reflection note
    assert_eq!(orchestrator.state("trim").await.unwrap().unwrap().messages.len(), 5);

    llm.push_ok(Completion::structured(&json!({ "action": "what can you do" })));
    llm.push_ok(Completion::structured(&json!({
        "answer": "I can help with GitHub.",
        "metadata": { "requires_user_input": false, "input_fields": [] }
    })));
    orchestrator
        .interact_collect("second question", "trim")
        .await
        .unwrap();

    // 第 4 条之前的边界落在 tool 结果上，窗口向前扩展到请求，共 5 条
    let supervisor = &llm.requests()[4];
    assert_eq!(supervisor.format_name.as_deref(), Some("SupervisorAction"));
    assert_eq!(supervisor.messages.len(), 5);
    assert!(supervisor.messages[0].has_tool_calls());
    assert_eq!(supervisor.messages[4].content, "second question");
    assert_pairs_intact(&supervisor.messages);

    let state = orchestrator.state("trim").await.unwrap().unwrap();
    assert!(state
        .messages
        .iter()
        .all(|m| !m.content.starts_with("first question")));
    assert_pairs_intact(&state.messages);
}

#[test]
fn test_trimming_never_orphans_results() {
    let trimmer = HistoryTrimmer::new(3);
    let mut messages = vec![Message::user("q")];
    for i in 0..4 {
        let a = ToolCallRequest::new("get_repo_topics", json!({ "i": i }));
        let b = ToolCallRequest::new("get_repo_description", json!({ "i": i }));
        messages.push(Message::tool_request("", vec![a.clone(), b.clone()]));
        messages.push(Message::tool_result(&a.id, "[]"));
        messages.push(Message::tool_result(&b.id, "desc"));
    }

    for end in 1..=messages.len() {
        let prefix = &messages[..end];
        assert_pairs_intact(trimmer.retained(prefix));
    }
}

#[test]
fn test_trimming_is_idempotent() {
    let trimmer = HistoryTrimmer::new(4);
    let call = ToolCallRequest::new("get_repo_topics", json!({}));
    let messages = vec![
        Message::user("u1"),
        Message::assistant("a1").from_agent(AgentKind::Github),
        Message::user("u2"),
        Message::tool_request("", vec![call.clone()]),
        Message::tool_result(&call.id, "[]"),
        Message::assistant("a2").from_agent(AgentKind::Github),
        Message::user("u3"),
    ];
    let once: Vec<Message> = trimmer.retained(&messages).to_vec();
    assert_eq!(once.len(), 4);
    assert!(trimmer.removals(&once).is_empty());
    assert_eq!(trimmer.retained(&once), once.as_slice());
}
