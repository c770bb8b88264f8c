//! 页面层：Page 能力 trait、页面 ID、页面私有命令通道
//!
//! 每个页面在注册时绑定一条自己的命令通道（[`PageChannel`]），Show / Hide / Error 都经由该通道
//! 串行送达页面，并受 Drop 策略约束。

pub mod console;
pub mod loader;
pub mod mock;

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::dispatch::{Command, Dispatcher, Handler};
use crate::core::error::PageError;

pub use console::{ConsoleLoader, ConsolePage};
pub use loader::{LoadedPage, PageLoader, ResourceHandle};
pub use mock::{FailureMode, MockLoader, MockPage};

/// 页面 ID（非空性在注册时校验）
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&PageId> for PageId {
    fn from(id: &PageId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for PageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 页面过渡失败（由页面实现返回）
#[derive(Error, Debug)]
pub enum PageFault {
    #[error("transition cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// 页面能力：可见性开关 + 异步过渡
///
/// 默认的 `show` / `hide` 直接切换可见性；带动画或资源加载的页面覆盖它们，并在过渡期间留意
/// `cancel`。收到发给自己的 [`PageError`] 时默认隐藏自身。
#[async_trait]
pub trait Page: Send + Sync {
    fn set_visible(&self, visible: bool);

    fn is_visible(&self) -> bool;

    async fn show(&self, _cancel: &CancellationToken) -> Result<(), PageFault> {
        self.set_visible(true);
        Ok(())
    }

    async fn hide(&self, _cancel: &CancellationToken) -> Result<(), PageFault> {
        self.set_visible(false);
        Ok(())
    }

    fn on_error(&self, _error: &PageError) {
        self.set_visible(false);
    }
}

/// 发往单个页面的命令
#[derive(Debug)]
pub enum PageCommand {
    Show,
    Hide,
    /// 该页面的过渡失败通知
    Error(PageError),
}

impl Command for PageCommand {
    fn kind(&self) -> &'static str {
        match self {
            Self::Show => "show",
            Self::Hide => "hide",
            Self::Error(_) => "error",
        }
    }
}

/// 页面私有命令通道
pub type PageChannel = Dispatcher<PageCommand, Result<(), PageFault>>;

/// 把页面的处理逻辑挂到它自己的 Actor 上
struct PageActor {
    page: Arc<dyn Page>,
}

#[async_trait]
impl Handler<PageCommand> for PageActor {
    type Output = Result<(), PageFault>;

    async fn handle(&mut self, command: PageCommand, cancel: CancellationToken) -> Self::Output {
        match command {
            PageCommand::Show if cancel.is_cancelled() => Err(PageFault::Cancelled),
            PageCommand::Show => self.page.show(&cancel).await,
            PageCommand::Hide => self.page.hide(&cancel).await,
            PageCommand::Error(error) => {
                self.page.on_error(&error);
                Ok(())
            }
        }
    }
}

/// 为页面创建命令通道并启动其消费任务
pub fn map_commands(id: &PageId, page: Arc<dyn Page>) -> PageChannel {
    Dispatcher::spawn(format!("page:{id}"), PageActor { page })
}

/// 注册表条目：页面实例 + 它的私有通道（通道生命周期与条目一致）
#[derive(Clone)]
pub struct PageEntry {
    pub id: PageId,
    pub page: Arc<dyn Page>,
    pub channel: PageChannel,
}

impl PageEntry {
    /// 绑定新通道（需在 tokio 运行时内调用）
    pub fn bind(id: PageId, page: Arc<dyn Page>) -> Self {
        let channel = map_commands(&id, page.clone());
        Self { id, page, channel }
    }

    /// 关闭通道
    pub fn dispose(&self) {
        self.channel.close();
    }
}

impl fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageEntry")
            .field("id", &self.id)
            .field("visible", &self.page.is_visible())
            .field("channel", &self.channel)
            .finish()
    }
}
