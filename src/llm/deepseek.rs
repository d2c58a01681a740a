//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端；未指定 base_url 时使用官方端点
pub fn create_deepseek_client(
    base_url: Option<&str>,
    model: &str,
    api_key: impl Into<String>,
) -> OpenAiClient {
    OpenAiClient::new(Some(base_url.unwrap_or(DEEPSEEK_BASE_URL)), model, api_key)
}
