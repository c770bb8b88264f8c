//! Mock 页面与加载器（用于测试，无需真实渲染或资源后端）
//!
//! MockPage 记录 Show/Hide 调用次数，可配置失败模式与过渡耗时；MockLoader 统计实例化次数，
//! 可配置失败 key 与加载耗时。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::PageError;
use crate::page::{LoadedPage, Page, PageFault, PageLoader, ResourceHandle};

/// 失败模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailureMode {
    #[default]
    None,
    ShowFails,
    HideFails,
    BothFail,
}

/// 可观测的 Mock 页面
#[derive(Debug)]
pub struct MockPage {
    id: String,
    visible: AtomicBool,
    mode: Mutex<FailureMode>,
    delay: Mutex<Option<Duration>>,
    show_calls: AtomicUsize,
    hide_calls: AtomicUsize,
    last_error: Mutex<Option<PageError>>,
}

impl MockPage {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::unshared(id))
    }

    fn unshared(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visible: AtomicBool::new(false),
            mode: Mutex::new(FailureMode::None),
            delay: Mutex::new(None),
            show_calls: AtomicUsize::new(0),
            hide_calls: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn failing(id: impl Into<String>, mode: FailureMode) -> Arc<Self> {
        let page = Self::unshared(id);
        *page.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
        Arc::new(page)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_mode(&self, mode: FailureMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    /// 每次 Show/Hide 的过渡耗时
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn show_count(&self) -> usize {
        self.show_calls.load(Ordering::SeqCst)
    }

    pub fn hide_count(&self) -> usize {
        self.hide_calls.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<PageError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mode(&self) -> FailureMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn transition(&self, cancel: &CancellationToken) -> Result<(), PageFault> {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        match delay {
            Some(delay) => tokio::select! {
                _ = tokio::time::sleep(delay) => Ok(()),
                _ = cancel.cancelled() => Err(PageFault::Cancelled),
            },
            None => {
                tokio::task::yield_now().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Page for MockPage {
    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    async fn show(&self, cancel: &CancellationToken) -> Result<(), PageFault> {
        self.show_calls.fetch_add(1, Ordering::SeqCst);
        self.transition(cancel).await?;
        if matches!(self.mode(), FailureMode::ShowFails | FailureMode::BothFail) {
            return Err(anyhow::anyhow!("Show failed for page: {}", self.id).into());
        }
        self.set_visible(true);
        Ok(())
    }

    async fn hide(&self, cancel: &CancellationToken) -> Result<(), PageFault> {
        self.hide_calls.fetch_add(1, Ordering::SeqCst);
        self.transition(cancel).await?;
        if matches!(self.mode(), FailureMode::HideFails | FailureMode::BothFail) {
            return Err(anyhow::anyhow!("Hide failed for page: {}", self.id).into());
        }
        self.set_visible(false);
        Ok(())
    }

    fn on_error(&self, error: &PageError) {
        self.set_visible(false);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
    }
}

/// 计数的 Mock 加载器：每个 key 实例化出一个 MockPage
#[derive(Debug, Default)]
pub struct MockLoader {
    calls: AtomicUsize,
    next_instance: AtomicU64,
    delay: Mutex<Option<Duration>>,
    failing_keys: Mutex<HashSet<String>>,
    pages: Mutex<HashMap<String, Arc<MockPage>>>,
    released: Mutex<Vec<ResourceHandle>>,
}

impl MockLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }

    pub fn recover_key(&self, key: &str) {
        self.failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// `instantiate` 被调用的总次数
    pub fn instantiate_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 该 key 最近一次实例化出的页面
    pub fn page(&self, key: &str) -> Option<Arc<MockPage>> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn released(&self) -> Vec<ResourceHandle> {
        self.released
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PageLoader for MockLoader {
    async fn instantiate(&self, key: &str, _parent: Option<&str>) -> anyhow::Result<LoadedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let failing = self
            .failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key);
        if failing {
            anyhow::bail!("Failed to instantiate '{key}'");
        }

        let page = MockPage::new(key);
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), page.clone());

        Ok(LoadedPage {
            page,
            handle: ResourceHandle {
                key: key.to_string(),
                instance: self.next_instance.fetch_add(1, Ordering::SeqCst),
            },
        })
    }

    fn release(&self, handle: &ResourceHandle) {
        self.released
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.clone());
    }
}
