//! 核心层：错误分类、检索任务调度、取消与截止时间

pub mod error;
pub mod shutdown;
pub mod task_scheduler;

pub use error::{JudgmentError, ResearchError, RetrievalError};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use task_scheduler::TaskScheduler;
