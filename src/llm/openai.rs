//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 OpenAI、DeepSeek、自建代理等。
//! 同一请求可以同时携带 tools（tool_choice=auto）与 json_schema 格式约束。
//! 限流与 5xx 由 async_openai 内置的指数退避重试。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolChoiceOption,
    ChatCompletionTools, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateChatCompletionResponse, FunctionCall, FunctionObject, ResponseFormat,
    ResponseFormatJsonSchema, ToolChoiceOptions,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError};
use crate::memory::{Message, Role, ToolCallRequest};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与模型名，complete 时把 Message 转成 API 格式
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/'))
            .with_api_key(api_key.into());

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature: 0.0,
            usage: TokenUsage::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// 单次 HTTP 请求超时；构建失败时保留默认 HTTP Client
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match reqwest::Client::builder().timeout(timeout).build() {
            Ok(http) => self.client = std::mem::take(&mut self.client).with_http_client(http),
            Err(e) => tracing::warn!("Failed to apply LLM request timeout: {}", e),
        }
        self
    }

    fn build_request(
        &self,
        request: &CompletionRequest<'_>,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system_prompt)
                    .build()
                    .map_err(map_openai_error)?
                    .into(),
            );
        }
        for m in request.messages {
            messages.push(to_openai_message(m)?);
        }

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone())
            .messages(messages)
            .temperature(self.temperature);

        if let Some(tools) = request.tools.filter(|t| !t.is_empty()) {
            let tools: Vec<ChatCompletionTools> = tools
                .iter()
                .map(|t| {
                    ChatCompletionTools::Function(ChatCompletionTool {
                        function: FunctionObject {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.parameters.clone()),
                            strict: None,
                        },
                    })
                })
                .collect();
            args.tools(tools)
                .tool_choice(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto));
        }

        if let Some(format) = request.response_format {
            args.response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: format.name.clone(),
                    schema: Some(format.schema.clone()),
                    strict: Some(false),
                },
            });
        }

        args.build().map_err(map_openai_error)
    }

    fn to_completion(&self, response: CreateChatCompletionResponse) -> Result<Completion, LlmError> {
        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|call| match call {
                ChatCompletionMessageToolCalls::Function(tc) => Some(ToolCallRequest {
                    id: tc.id,
                    name: tc.function.name,
                    // 参数不是合法 JSON 时原样保留，交给工具的参数校验报错
                    arguments: serde_json::from_str(&tc.function.arguments)
                        .unwrap_or(Value::String(tc.function.arguments)),
                }),
                ChatCompletionMessageToolCalls::Custom(tc) => {
                    tracing::warn!("Ignoring custom tool call {}", tc.id);
                    None
                }
            })
            .collect();

        Ok(Completion {
            content: choice.message.content,
            tool_calls,
        })
    }
}

fn to_openai_message(m: &Message) -> Result<ChatCompletionRequestMessage, LlmError> {
    let message: ChatCompletionRequestMessage = match m.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(m.content.as_str())
            .build()
            .map_err(map_openai_error)?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(m.content.as_str())
            .build()
            .map_err(map_openai_error)?
            .into(),
        Role::Tool => ChatCompletionRequestToolMessageArgs::default()
            .content(m.content.as_str())
            .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
            .build()
            .map_err(map_openai_error)?
            .into(),
        Role::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !m.content.is_empty() || !m.has_tool_calls() {
                args.content(m.content.as_str());
            }
            if m.has_tool_calls() {
                let calls: Vec<ChatCompletionMessageToolCalls> = m
                    .tool_calls
                    .iter()
                    .map(|c| {
                        ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                            id: c.id.clone(),
                            function: FunctionCall {
                                name: c.name.clone(),
                                arguments: c.arguments.to_string(),
                            },
                        })
                    })
                    .collect();
                args.tool_calls(calls);
            }
            args.build().map_err(map_openai_error)?.into()
        }
    };
    Ok(message)
}

fn map_openai_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::Reqwest(e) if e.is_timeout() => {
            LlmError::Network(format!("Request timeout: {e}"))
        }
        OpenAIError::Reqwest(e) => LlmError::Network(format!("Request failed: {e}")),
        OpenAIError::ApiError(api) => {
            let rate_limited = api
                .code
                .iter()
                .chain(api.r#type.iter())
                .any(|c| c.contains("rate_limit"));
            if rate_limited {
                LlmError::RateLimited(api.message)
            } else {
                LlmError::Api(api.to_string())
            }
        }
        OpenAIError::JSONDeserialize(e, _) => {
            LlmError::Parse(format!("Failed to parse response: {e}"))
        }
        OpenAIError::InvalidArgument(msg) => LlmError::Parse(format!("Invalid request: {msg}")),
        other => LlmError::Network(other.to_string()),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
        let req = self.build_request(&request)?;
        let response = self.client.chat().create(req).await.map_err(|e| {
            let e = map_openai_error(e);
            tracing::error!("LLM request failed: {}", e);
            e
        })?;
        self.to_completion(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{StructuredOutput, ToolSpec};
    use async_openai::error::ApiError;
    use serde_json::json;

    #[test]
    fn test_request_carries_tools_and_format() {
        let client = OpenAiClient::new(Some("http://localhost:1/v1/"), "gpt-4o-mini", "k");
        let call = ToolCallRequest::new("list_pull_requests", json!({"repo": "a/b"}));
        let messages = vec![
            Message::user("list PRs"),
            Message::tool_request("", vec![call.clone()]),
            Message::tool_result(&call.id, "[]"),
        ];
        let tools = vec![ToolSpec {
            name: "list_pull_requests".into(),
            description: "List PRs".into(),
            parameters: json!({"type": "object"}),
        }];
        let format = StructuredOutput {
            name: "AgentAnswer".into(),
            schema: json!({"type": "object"}),
        };
        let request = CompletionRequest::new("You are Jarvis", &messages)
            .with_tools(&tools)
            .with_format(&format);
        let body = serde_json::to_value(client.build_request(&request).unwrap()).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are Jarvis");
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert!(body["messages"][2].get("content").is_none());
        assert_eq!(body["messages"][2]["tool_calls"][0]["id"], call.id.as_str());
        assert_eq!(body["messages"][2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            r#"{"repo":"a/b"}"#
        );
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], call.id.as_str());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "list_pull_requests");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "AgentAnswer");
        assert_eq!(body["response_format"]["json_schema"]["strict"], false);
    }

    #[test]
    fn test_request_without_tools_omits_tool_choice() {
        let client = OpenAiClient::new(None, "gpt-4o-mini", "k");
        let messages = vec![Message::user("hi")];
        let body = serde_json::to_value(
            client
                .build_request(&CompletionRequest::new("", &messages))
                .unwrap(),
        )
        .unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_response_maps_tool_calls_and_usage() {
        let client = OpenAiClient::new(None, "gpt-4o-mini", "k");
        let response: CreateChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "get_repo_topics", "arguments": "{\"repo_name\":\"org/svc\"}" }
                        },
                        {
                            "id": "call_2",
                            "type": "function",
                            "function": { "name": "list_pull_requests", "arguments": "not json" }
                        }
                    ]
                }
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        }))
        .unwrap();

        let completion = client.to_completion(response).unwrap();
        assert!(completion.content.is_none());
        assert_eq!(completion.tool_calls.len(), 2);
        assert_eq!(completion.tool_calls[0].id, "call_1");
        assert_eq!(completion.tool_calls[0].arguments["repo_name"], "org/svc");
        assert_eq!(
            completion.tool_calls[1].arguments,
            Value::String("not json".into())
        );
        assert_eq!(client.token_usage(), (12, 3, 15));
    }

    #[test]
    fn test_response_without_choices_is_parse_error() {
        let client = OpenAiClient::new(None, "gpt-4o-mini", "k");
        let response: CreateChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": []
        }))
        .unwrap();
        let err = client.to_completion(response).unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }

    #[test]
    fn test_api_errors_classified() {
        let limited = map_openai_error(OpenAIError::ApiError(ApiError {
            message: "slow down".into(),
            r#type: Some("requests".into()),
            param: None,
            code: Some("rate_limit_exceeded".into()),
        }));
        assert_eq!(limited, LlmError::RateLimited("slow down".into()));

        let invalid = map_openai_error(OpenAIError::ApiError(ApiError {
            message: "bad schema".into(),
            r#type: Some("invalid_request_error".into()),
            param: None,
            code: None,
        }));
        assert!(matches!(invalid, LlmError::Api(ref m) if m.contains("bad schema")));
    }

    #[test]
    fn test_token_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.add(10, 5);
        usage.add(1, 1);
        assert_eq!(usage.get(), (11, 6, 17));
    }
}
