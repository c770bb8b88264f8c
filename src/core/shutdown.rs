//! 优雅关闭处理
//!
//! 统一监听关闭信号（Ctrl+C、SIGTERM、输入结束），然后按注册顺序执行清理任务：
//! - Navigator 停止接收新命令
//! - 懒加载页面的资源句柄被释放、页面通道被关闭
//!
//! 每个清理任务都有超时，单个任务失败或超时不影响后续任务。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户发起的退出 (Ctrl+C 或 quit 命令)
    UserInitiated,
    /// SIGTERM 信号
    Signal,
    /// 命令输入流结束
    InputClosed,
    /// 致命错误
    FatalError(String),
}

/// 关闭信号管理器：首个触发的原因生效，之后的触发被忽略
#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason, _) = watch::channel(None);
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(reason),
        }
    }

    /// 关闭 token（用于取消进行中的导航过渡）
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭
    pub fn shutdown(&self, reason: ShutdownReason) {
        let first = self.reason.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if first {
            tracing::info!(?reason, "shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 生效的关闭原因（尚未关闭时为 None）
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.borrow().clone()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
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

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 清理结果汇总
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub completed: Vec<&'static str>,
    pub failed: Vec<&'static str>,
    pub timed_out: Vec<&'static str>,
}

/// 关闭协调器：按注册顺序执行清理任务
pub struct ShutdownCoordinator {
    manager: ShutdownManager,
    tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(manager: ShutdownManager) -> Self {
        Self {
            manager,
            tasks: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    /// 单个清理任务的超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.tasks.push(Arc::new(task));
    }

    pub async fn run_cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for task in &self.tasks {
            let name = task.name();
            match tokio::time::timeout(self.timeout, task.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::debug!(task = name, "cleanup completed");
                    report.completed.push(name);
                }
                Ok(Err(e)) => {
                    tracing::warn!(task = name, "cleanup failed: {e}");
                    report.failed.push(name);
                }
                Err(_) => {
                    tracing::warn!(task = name, "cleanup timed out after {:?}", self.timeout);
                    report.timed_out.push(name);
                }
            }
        }
        report
    }

    pub fn manager(&self) -> &ShutdownManager {
        &self.manager
    }

    /// 运行 `app` 直到其结束或收到关闭信号，然后执行全部清理
    pub async fn run<F>(&self, app: F) -> CleanupReport
    where
        F: Future<Output = ()>,
    {
        self.manager.install_signal_handlers();

        tokio::select! {
            _ = app => tracing::debug!("application finished"),
            _ = self.manager.wait_for_shutdown() => tracing::debug!("shutdown signal received"),
        }

        self.run_cleanup().await
    }
}
