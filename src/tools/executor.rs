//! 工具执行器
//!
//! 持有某个 Agent 的 ToolRegistry，执行一批 tool call 并为每个调用产出一条 tool 结果消息。
//! 同一批调用并发执行、按原顺序返回；单个调用失败只影响它自己的结果。
//! 每次调用输出结构化审计日志（JSON）。超时由工具内部的 HTTP 会话负责。

use std::time::Instant;

use futures_util::future::join_all;

use crate::core::AgentKind;
use crate::memory::{Message, ToolCallRequest};
use crate::tools::{ToolError, ToolRegistry};

/// 工具执行器
#[derive(Clone)]
pub struct ToolExecutor {
    agent: AgentKind,
    registry: ToolRegistry,
    max_result_chars: usize,
}

impl ToolExecutor {
    pub fn new(agent: AgentKind, registry: ToolRegistry, max_result_chars: usize) -> Self {
        Self {
            agent,
            registry,
            max_result_chars,
        }
    }

    /// 执行单个调用；失败时返回 `Error: ...` 文本，由模型自行决定如何处理
    pub async fn execute(&self, call: &ToolCallRequest) -> Message {
        let start = Instant::now();
        let result = match self.registry.get(&call.name) {
            Some(tool) => tool.execute(call.arguments.clone()).await,
            None => Err(ToolError::Execution(format!("Unknown tool: {}", call.name))),
        };

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok"),
            Err(ToolError::Network(_)) => (false, "network"),
            Err(ToolError::InvalidArguments { .. }) => (false, "invalid_args"),
            Err(_) => (false, "error"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "agent": self.agent.as_str(),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let content = match result {
            Ok(content) => truncate(content, self.max_result_chars),
            Err(e) => format!("Error: {e}"),
        };
        Message::tool_result(&call.id, content)
    }

    /// 并发执行一批调用，结果顺序与调用顺序一致
    pub async fn execute_batch(&self, calls: &[ToolCallRequest]) -> Vec<Message> {
        join_all(calls.iter().map(|call| self.execute(call))).await
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

fn truncate(content: String, max_chars: usize) -> String {
    if max_chars == 0 || content.chars().count() <= max_chars {
        return content;
    }
    let mut out: String = content.chars().take(max_chars).collect();
    out.push_str("\n...[truncated]");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    struct Slow {
        name: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "sleeps then echoes"
        }
        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(self.name.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Err(ToolError::Http {
                status: 500,
                body: "boom".to_string(),
            })
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(Slow {
                name: "slow",
                delay_ms: 30,
            }))
            .unwrap();
        registry
            .register(Arc::new(Slow {
                name: "fast",
                delay_ms: 0,
            }))
            .unwrap();
        registry.register(Arc::new(Broken)).unwrap();
        ToolExecutor::new(AgentKind::Github, registry, 8000)
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let calls = vec![
            ToolCallRequest::new("slow", json!({})),
            ToolCallRequest::new("fast", json!({})),
        ];
        let results = executor().execute_batch(&calls).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "slow");
        assert_eq!(results[0].tool_call_id.as_deref(), Some(calls[0].id.as_str()));
        assert_eq!(results[1].content, "fast");
    }

    #[tokio::test]
    async fn test_failure_isolated_to_its_call() {
        let calls = vec![
            ToolCallRequest::new("broken", json!({})),
            ToolCallRequest::new("fast", json!({})),
        ];
        let results = executor().execute_batch(&calls).await;
        assert!(results[0].content.starts_with("Error:"));
        assert!(results[0].content.contains("boom"));
        assert_eq!(results[1].content, "fast");
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_text() {
        let call = ToolCallRequest::new("nope", json!({}));
        let result = executor().execute(&call).await;
        let expected = ToolError::Execution("Unknown tool: nope".to_string());
        assert_eq!(result.content, format!("Error: {expected}"));
        assert_eq!(result.tool_call_id.as_deref(), Some(call.id.as_str()));
    }

    #[test]
    fn test_truncate_long_result() {
        let out = truncate("abcdef".to_string(), 3);
        assert!(out.starts_with("abc"));
        assert!(out.ends_with("[truncated]"));
        assert_eq!(truncate("abc".to_string(), 3), "abc");
    }
}
