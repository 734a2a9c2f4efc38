//! 任务调度：检索任务池
//!
//! 每轮的 N×K 个检索任务共享一个 Semaphore 限制并发；等待许可时同样响应取消。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// 检索任务调度器
#[derive(Clone)]
pub struct TaskScheduler {
    /// 检索并发限制
    retrieval_semaphore: Arc<Semaphore>,
}

impl TaskScheduler {
    pub fn new(max_concurrent_tasks: usize) -> Self {
        Self {
            retrieval_semaphore: Arc::new(Semaphore::new(max_concurrent_tasks.max(1))),
        }
    }

    /// 获取检索许可；取消或信号量关闭时返回 None
    pub async fn acquire(&self, token: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        let semaphore = Arc::clone(&self.retrieval_semaphore);
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = semaphore.acquire_owned() => permit.ok(),
        }
    }

    /// 当前可用许可数
    pub fn available(&self) -> usize {
        self.retrieval_semaphore.available_permits()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(8)
    }
}
