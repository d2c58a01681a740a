//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 脚本化）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use mock::{MockLlmClient, RecordedRequest, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage, OPENAI_BASE_URL};
pub use traits::{Completion, CompletionRequest, LlmClient, LlmError, StructuredOutput, ToolSpec};
