//! 错误总线：所有 PageError 事件的广播出口
//!
//! 事件只作通知，Navigator 自身不订阅，也不依据它做控制流决策。

use tokio::sync::broadcast;

use crate::core::error::PageError;

/// 广播缓冲区默认大小（订阅方落后时丢弃最旧事件）
pub const DEFAULT_ERROR_CAPACITY: usize = 64;

/// PageError 广播总线（可克隆，所有克隆共享同一通道）
#[derive(Clone, Debug)]
pub struct PageErrorBus {
    tx: broadcast::Sender<PageError>,
}

impl PageErrorBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 发布错误事件；没有订阅者时事件被丢弃
    pub fn publish(&self, error: PageError) {
        tracing::debug!(
            page = %error.page_id,
            op = %error.operation,
            code = %error.code,
            "{}",
            error.message
        );
        let _ = self.tx.send(error);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageError> {
        self.tx.subscribe()
    }
}

impl Default for PageErrorBus {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_CAPACITY)
    }
}
