//! LLM 层：客户端抽象与实现（OpenAI 兼容 / 重试包装 / Mock）

pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{LlmClient, LlmError};
