//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / 脚本化）实现 LlmClient::complete：一次请求可以同时携带
//! 工具定义与结构化输出 schema，返回文本（结构化 JSON）或工具调用。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::memory::{Message, ToolCallRequest};

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error: {0}")]
    Api(String),

    /// 响应无法解析（包括结构化输出不符合 schema）
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),
}

/// 暴露给模型的工具定义（OpenAI function 格式）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema（object）
    pub parameters: serde_json::Value,
}

/// 结构化输出约束：名称 + 由类型派生的 JSON Schema
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StructuredOutput {
    pub name: String,
    pub schema: serde_json::Value,
}

impl StructuredOutput {
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(schema).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// 一次模型调用的输入
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub messages: &'a [Message],
    pub tools: Option<&'a [ToolSpec]>,
    pub response_format: Option<&'a StructuredOutput>,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(system_prompt: &'a str, messages: &'a [Message]) -> Self {
        Self {
            system_prompt,
            messages,
            tools: None,
            response_format: None,
        }
    }

    pub fn with_tools(mut self, tools: &'a [ToolSpec]) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_format(mut self, format: &'a StructuredOutput) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// 模型的一次输出：文本内容和/或工具调用
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// 将值序列化为 JSON 文本（Mock 与测试用来模拟结构化输出）
    pub fn structured<T: Serialize>(value: &T) -> Self {
        Self::text(serde_json::to_string(value).unwrap_or_default())
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// 按结构化输出 schema 解析 content；兼容被 ```json 围起来的输出
    pub fn parse_structured<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        let raw = self
            .content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LlmError::Parse("empty response".to_string()))?;
        let body = strip_code_fence(raw);
        serde_json::from_str(body).map_err(|e| LlmError::Parse(format!("{e}: {body}")))
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
