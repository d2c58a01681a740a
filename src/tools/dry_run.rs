//! Dry-run 包装
//!
//! 开启后每个工具都被包装：不访问外部系统，直接返回该工具声明的固定响应。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::rest::render;
use crate::tools::{Tool, ToolError, ToolRegistry};

/// 包装一个工具，执行时返回固定数据
pub struct DryRunTool {
    inner: Arc<dyn Tool>,
}

impl DryRunTool {
    pub fn wrap(inner: Arc<dyn Tool>) -> Arc<dyn Tool> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl Tool for DryRunTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    fn dry_run_response(&self) -> Option<Value> {
        self.inner.dry_run_response()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        tracing::info!(tool = self.name(), "Running in dry-run mode, returning mock data.");
        let value = self.inner.dry_run_response().unwrap_or_else(|| {
            serde_json::json!({
                "dry_run": true,
                "tool": self.name(),
                "args": args,
            })
        });
        Ok(render(value))
    }
}

/// 把注册表中的所有工具替换为 dry-run 版本
pub fn dry_run_registry(registry: ToolRegistry) -> ToolRegistry {
    registry.map_tools(DryRunTool::wrap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
        mock: Option<Value>,
    }

    #[async_trait]
    impl Tool for Counting {
        fn name(&self) -> &str {
            "create_jira_issue"
        }
        fn description(&self) -> &str {
            "creates an issue"
        }
        fn dry_run_response(&self) -> Option<Value> {
            self.mock.clone()
        }
        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("real".to_string())
        }
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_inner() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = DryRunTool::wrap(Arc::new(Counting {
            calls: Arc::clone(&calls),
            mock: Some(json!("OPENSD-1234 created")),
        }));
        let out = tool.execute(json!({"summary": "x"})).await.unwrap();
        assert_eq!(out, "OPENSD-1234 created");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dry_run_generic_placeholder() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(Counting {
                calls: Arc::new(AtomicUsize::new(0)),
                mock: None,
            }))
            .unwrap();
        let registry = dry_run_registry(registry);
        let out = registry
            .get("create_jira_issue")
            .unwrap()
            .execute(json!({"summary": "x"}))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["dry_run"], true);
        assert_eq!(v["args"]["summary"], "x");
    }
}
