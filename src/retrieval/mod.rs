//! 检索层：统一的 RetrievalAdapter 契约与具体后端
//!
//! 适配器把后端结果规整为 RetrievedItem，并以 RetrievalError 报告失败，绝不 panic 或抛出未分类错误。
//! 同一实例会被多个任务并发调用，因此方法只取 &self。

pub mod fixed;
pub mod knowledge_base;
pub mod web;

use async_trait::async_trait;

pub use crate::core::RetrievalError;
pub use crate::research::types::{BackendKind, Query, RetrievedItem};
pub use fixed::StaticAdapter;
pub use knowledge_base::KnowledgeBaseAdapter;
pub use web::WebSearchAdapter;

/// 检索适配器
#[async_trait]
pub trait RetrievalAdapter: Send + Sync {
    /// 该适配器对应的后端类型（决定引用编号方案）
    fn kind(&self) -> BackendKind;

    /// 执行一次检索；可在内部做有限次重试，但对外只报告最终结果
    async fn search(&self, query: &Query) -> Result<Vec<RetrievedItem>, RetrievalError>;
}

/// reqwest 错误归类：超时 / 解码失败 / 其余视为不可用；去掉 URL（其中带 api key）
pub(crate) fn classify_reqwest(err: reqwest::Error) -> RetrievalError {
    let err = err.without_url();
    if err.is_timeout() {
        RetrievalError::Timeout
    } else if err.is_decode() {
        RetrievalError::Malformed(err.to_string())
    } else {
        RetrievalError::Unavailable(err.to_string())
    }
}

/// HTTP 状态码归类：408/504 超时，其余 4xx 拒绝，5xx 不可用
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> RetrievalError {
    let detail = format!("HTTP {}: {}", status, truncate_chars(body, 200));
    match status.as_u16() {
        408 | 504 => RetrievalError::Timeout,
        400..=499 => RetrievalError::Rejected(detail),
        _ => RetrievalError::Unavailable(detail),
    }
}

/// 按字符截断
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
