//! 客户端层重试：仅对 Transient 错误按指数退避重试
//!
//! 研究循环不重试判断调用；需要重试时在构建客户端时用 RetryingLlmClient 包一层。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 首次失败后的最大重试次数
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// 带重试的 LLM 客户端包装
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(messages).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let wait = self.config.backoff(attempt);
                    tracing::warn!(attempt = attempt + 1, wait_ms = wait.as_millis() as u64, error = %e, "llm call failed, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
