//! 描述符驱动的 REST 工具
//!
//! 每个集成把自己的操作声明为一个实现 Operation 的枚举（名称、描述、参数 schema、dry-run 响应、执行逻辑），
//! RestTool 把单个操作适配为 Tool；参数类型由 schemars 派生 schema 并用 serde 解析。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::tools::{Tool, ToolError, ToolRegistry};

/// 某个集成的一个操作
#[async_trait]
pub trait Operation: Copy + Send + Sync + 'static {
    /// 操作所需的 API 客户端（持有 Endpoint）
    type Api: Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn parameters(&self) -> Value;

    /// dry-run 模式下返回的固定响应
    fn mock_response(&self) -> Value;

    async fn run(&self, api: &Self::Api, args: Value) -> Result<Value, ToolError>;
}

/// 单个操作对应的工具
pub struct RestTool<O: Operation> {
    op: O,
    api: Arc<O::Api>,
}

impl<O: Operation> RestTool<O> {
    pub fn new(op: O, api: Arc<O::Api>) -> Self {
        Self { op, api }
    }
}

#[async_trait]
impl<O: Operation> Tool for RestTool<O> {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn parameters_schema(&self) -> Value {
        self.op.parameters()
    }

    fn dry_run_response(&self) -> Option<Value> {
        Some(self.op.mock_response())
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let value = self.op.run(&self.api, args).await?;
        Ok(render(value))
    }
}

/// 为一组操作建立注册表
pub fn registry_of<O: Operation>(ops: &[O], api: Arc<O::Api>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    for op in ops {
        registry.register(Arc::new(RestTool::new(*op, Arc::clone(&api))))?;
    }
    Ok(registry)
}

/// 按类型解析工具参数；缺省参数（null）视为空对象
pub fn parse_args<A: DeserializeOwned>(tool: &str, args: Value) -> Result<A, ToolError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// 由参数类型派生 JSON Schema（去掉 $schema / title 等模型不需要的顶层字段）
pub fn schema_of<A: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(A)).unwrap_or(Value::Null);
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

/// 字符串结果原样返回，其它值输出为缩进 JSON
pub fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct RepoArgs {
        /// 仓库名
        repo: String,
        #[serde(default)]
        limit: Option<u32>,
    }

    #[derive(Clone, Copy)]
    enum EchoOp {
        Repo,
    }

    struct EchoApi;

    #[async_trait]
    impl Operation for EchoOp {
        type Api = EchoApi;

        fn name(&self) -> &'static str {
            "echo_repo"
        }
        fn description(&self) -> &'static str {
            "Echo the repo name"
        }
        fn parameters(&self) -> Value {
            schema_of::<RepoArgs>()
        }
        fn mock_response(&self) -> Value {
            json!("mock")
        }
        async fn run(&self, _api: &EchoApi, args: Value) -> Result<Value, ToolError> {
            let args: RepoArgs = parse_args(self.name(), args)?;
            Ok(json!({ "repo": args.repo, "limit": args.limit.unwrap_or(1) }))
        }
    }

    #[tokio::test]
    async fn test_rest_tool_parses_and_renders() {
        let registry = registry_of(&[EchoOp::Repo], Arc::new(EchoApi)).unwrap();
        let tool = registry.get("echo_repo").unwrap();
        let out = tool.execute(json!({"repo": "jarvis"})).await.unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["repo"], "jarvis");
        assert_eq!(v["limit"], 1);
    }

    #[tokio::test]
    async fn test_rest_tool_rejects_bad_args() {
        let tool = RestTool::new(EchoOp::Repo, Arc::new(EchoApi));
        let err = tool.execute(json!({"limit": 3})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = schema_of::<RepoArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["required"], json!(["repo"]));
    }
}
