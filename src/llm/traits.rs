//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete 返回文本，失败分为 Transient / Fatal。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 网络、限流、服务端 5xx 等可重试错误
    #[error("Transient LLM error: {0}")]
    Transient(String),

    /// 认证失败、请求非法等不可重试错误
    #[error("Fatal LLM error: {0}")]
    Fatal(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transient(_))
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
