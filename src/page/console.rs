//! 控制台页面：把可见性变化写入日志，供 `screen-nav` 演示程序使用

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::page::{LoadedPage, Page, PageFault, PageLoader, ResourceHandle};

/// 只打日志的页面；`transition` 模拟过渡动画耗时
#[derive(Debug)]
pub struct ConsolePage {
    id: String,
    visible: AtomicBool,
    transition: Duration,
}

impl ConsolePage {
    pub fn new(id: impl Into<String>, transition: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            visible: AtomicBool::new(false),
            transition,
        })
    }

    async fn animate(&self, cancel: &CancellationToken) -> Result<(), PageFault> {
        if self.transition.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(self.transition) => Ok(()),
            _ = cancel.cancelled() => Err(PageFault::Cancelled),
        }
    }
}

#[async_trait]
impl Page for ConsolePage {
    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    async fn show(&self, cancel: &CancellationToken) -> Result<(), PageFault> {
        self.animate(cancel).await?;
        self.set_visible(true);
        tracing::info!(page = %self.id, "page shown");
        Ok(())
    }

    async fn hide(&self, cancel: &CancellationToken) -> Result<(), PageFault> {
        self.animate(cancel).await?;
        self.set_visible(false);
        tracing::info!(page = %self.id, "page hidden");
        Ok(())
    }
}

/// 模拟资源加载的控制台加载器：`load_delay` 后实例化一个 ConsolePage
#[derive(Debug)]
pub struct ConsoleLoader {
    load_delay: Duration,
    transition: Duration,
    next_instance: AtomicU64,
}

impl ConsoleLoader {
    pub fn new(load_delay: Duration, transition: Duration) -> Self {
        Self {
            load_delay,
            transition,
            next_instance: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PageLoader for ConsoleLoader {
    async fn instantiate(&self, key: &str, parent: Option<&str>) -> anyhow::Result<LoadedPage> {
        tracing::info!(key, parent, "instantiating page");
        tokio::time::sleep(self.load_delay).await;
        Ok(LoadedPage {
            page: ConsolePage::new(key, self.transition),
            handle: ResourceHandle {
                key: key.to_string(),
                instance: self.next_instance.fetch_add(1, Ordering::SeqCst),
            },
        })
    }

    fn release(&self, handle: &ResourceHandle) {
        tracing::info!(key = %handle.key, instance = handle.instance, "released page resource");
    }
}
