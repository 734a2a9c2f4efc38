//! 研究取消处理
//!
//! 提供统一的取消信号：Ctrl+C / SIGTERM 以及整体截止时间都会触发同一个 CancellationToken，
//! 研究循环据此把正在进行的检索任务优雅收尾（已收集的结果仍会被折叠）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 取消原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户发起的退出 (Ctrl+C)
    UserInitiated,
    /// SIGTERM 信号
    Signal,
    /// 整体截止时间到达
    Deadline,
}

/// 取消信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(4);
        Self {
            token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 获取取消 token（交给研究循环）
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发取消；只有第一次触发会广播原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.token.is_cancelled() {
            return;
        }
        tracing::info!(reason = ?reason, "cancelling research");
        let _ = self.reason_tx.send(reason);
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 订阅取消原因
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    /// 在 duration 之后触发 Deadline 取消
    pub fn arm_deadline(self: &Arc<Self>, duration: Duration) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = manager.token.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    manager.shutdown(ShutdownReason::Deadline);
                }
            }
        });
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, stopping research...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, stopping research...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
