//! 错误类型：检索失败（本地降级）、判断能力失败（中止运行）、研究循环错误
//!
//! RetrievalError 在轮内被折叠为占位 Finding，不会向上传播；
//! JudgmentError 无论 Transient / Fatal 都会中止本次运行（循环本身不做重试）。

use thiserror::Error;

use crate::llm::LlmError;

/// 单个检索任务的失败类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("Timeout")]
    Timeout,

    /// 底层通道未建立或任何未分类的异常，保留原始消息便于诊断
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// 后端拒绝请求（4xx 类）
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    /// 循环级取消打断了任务；仅由轮执行器产生，适配器不会返回
    #[error("Cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// 失败类型的短名称（用于占位文本与事件）
    pub fn kind(&self) -> &'static str {
        match self {
            RetrievalError::Timeout => "timeout",
            RetrievalError::Unavailable(_) => "unavailable",
            RetrievalError::Rejected(_) => "rejected",
            RetrievalError::Malformed(_) => "malformed",
            RetrievalError::Cancelled => "cancelled",
        }
    }
}

/// 判断能力（查询生成 / 反思 / 合成）的失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JudgmentError {
    /// 可重试的失败（网络、限流、结构化输出解析失败），由调用方自行决定是否重试
    #[error("Transient judgment error: {0}")]
    Transient(String),

    #[error("Fatal judgment error: {0}")]
    Fatal(String),
}

impl From<LlmError> for JudgmentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Transient(msg) => JudgmentError::Transient(msg),
            LlmError::Fatal(msg) => JudgmentError::Fatal(msg),
        }
    }
}

/// 研究循环对外暴露的错误
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Research topic is empty")]
    EmptyTopic,

    #[error("Invalid research config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Judgment(#[from] JudgmentError),

    /// 在产生任何研究结果之前已被取消
    #[error("Research cancelled")]
    Cancelled,
}
