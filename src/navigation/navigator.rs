//! Navigator：导航状态机
//!
//! 状态隐含在（页面栈，渲染集合）中，由四个操作驱动：
//! - To：清空栈并显示目标页
//! - Push：隐藏栈顶、显示目标页并压栈
//! - Replace：弹出并隐藏栈顶、显示目标页并压栈
//! - Back：弹出并隐藏栈顶、重新显示新的栈顶
//!
//! 所有操作遵循「解析 → 守卫 → 改栈 → Presenter 过渡 → 提交」，解析与 Show 失败都转为错误事件发布，
//! 绝不在栈上留下未成功显示的页面。Navigator 作为一个 Actor 运行（见 [`PageNavigator::spawn`]），
//! 外部通过 [`NavigatorHandle`] 发布命令并读取状态快照。

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::dispatch::{Command, Delivery, Dispatcher, Handler};
use crate::core::error::{PageError, PageErrorCode, PageOperation};
use crate::core::events::PageErrorBus;
use crate::navigation::{PagePresenter, PageRegistry, PageStack};
use crate::page::{PageEntry, PageId};

/// 导航命令（外部发布给 Navigator）
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavCommand {
    To(PageId),
    Push(PageId),
    Replace(PageId),
    Back,
}

impl NavCommand {
    pub fn operation(&self) -> PageOperation {
        match self {
            Self::To(_) => PageOperation::To,
            Self::Push(_) => PageOperation::Push,
            Self::Replace(_) => PageOperation::Replace,
            Self::Back => PageOperation::Back,
        }
    }
}

impl Command for NavCommand {
    fn kind(&self) -> &'static str {
        match self {
            Self::To(_) => "to",
            Self::Push(_) => "push",
            Self::Replace(_) => "replace",
            Self::Back => "back",
        }
    }
}

/// 成功完成的导航结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// 该页面现在是当前页
    Shown(PageId),
    /// Back 之后栈已空，没有页面显示
    Emptied,
    /// 无操作（已是当前页、空栈 Back）
    Unchanged,
}

pub type NavResult = Result<Outcome, PageError>;

/// 栈与渲染集合的只读投影
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NavigationSnapshot {
    /// 自底向上
    pub stack: Vec<PageId>,
    pub rendering: BTreeSet<PageId>,
}

impl NavigationSnapshot {
    pub fn top(&self) -> Option<&PageId> {
        self.stack.last()
    }

    pub fn is_current_page(&self, id: &str) -> bool {
        self.top().is_some_and(|top| top.as_str() == id) && self.rendering.contains(id)
    }
}

pub struct PageNavigator {
    stack: PageStack,
    registry: Arc<PageRegistry>,
    presenter: PagePresenter,
    errors: PageErrorBus,
    rollback: bool,
    snapshot: watch::Sender<NavigationSnapshot>,
}

impl PageNavigator {
    pub fn new(registry: Arc<PageRegistry>, presenter: PagePresenter, errors: PageErrorBus) -> Self {
        let (snapshot, _) = watch::channel(NavigationSnapshot::default());
        Self {
            stack: PageStack::new(),
            registry,
            presenter,
            errors,
            rollback: true,
            snapshot,
        }
    }

    /// Show 失败时是否恢复失败前的栈并重新显示原栈顶
    pub fn with_rollback(mut self, rollback: bool) -> Self {
        self.rollback = rollback;
        self
    }

    /// 启动时调用：所有已解析页面置为隐藏
    pub async fn initialize(&mut self) {
        let entries = self.registry.entries().await;
        self.presenter.initialize(&entries);
        self.publish_snapshot();
    }

    /// 以 Actor 方式运行，返回发布命令用的句柄
    pub fn spawn(self) -> NavigatorHandle {
        let snapshot = self.snapshot.subscribe();
        let dispatcher = Dispatcher::spawn("navigator", self);
        NavigatorHandle {
            dispatcher,
            snapshot,
        }
    }

    /// 栈顶且正在渲染才算当前页
    pub fn is_current_page(&self, id: &PageId) -> bool {
        self.stack.is_top(id) && self.presenter.is_rendering(id)
    }

    pub fn stack(&self) -> &PageStack {
        &self.stack
    }

    pub fn presenter(&self) -> &PagePresenter {
        &self.presenter
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        NavigationSnapshot {
            stack: self.stack.as_slice().to_vec(),
            rendering: self.presenter.rendering().clone(),
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(self.snapshot());
    }

    pub async fn execute(&mut self, command: NavCommand, cancel: &CancellationToken) -> NavResult {
        match command {
            NavCommand::To(id) => self.to(id, cancel).await,
            NavCommand::Push(id) => self.push(id, cancel).await,
            NavCommand::Replace(id) => self.replace(id, cancel).await,
            NavCommand::Back => self.back(cancel).await,
        }
    }

    pub async fn to(&mut self, id: PageId, cancel: &CancellationToken) -> NavResult {
        let op = PageOperation::To;
        if self.already_current(&id, op) {
            return Ok(Outcome::Unchanged);
        }

        let entry = self.resolve(&id, op).await?;
        let previous = self.stack.as_slice().to_vec();

        while let Some(popped) = self.stack.try_pop() {
            self.hide(&popped, op).await;
        }

        if let Err(error) = self.presenter.show_page(&entry, op, cancel).await {
            self.restore(previous, &id, op).await;
            return Err(error);
        }

        self.stack.push(id.clone());
        Ok(Outcome::Shown(id))
    }

    pub async fn push(&mut self, id: PageId, cancel: &CancellationToken) -> NavResult {
        let op = PageOperation::Push;
        if self.already_current(&id, op) {
            return Ok(Outcome::Unchanged);
        }

        let entry = self.resolve(&id, op).await?;
        let previous = self.stack.as_slice().to_vec();

        // 已在栈顶但未渲染（之前显示失败）：只重新显示，不重复压栈
        let reshow = self.stack.is_top(&id);
        if !reshow {
            if let Some(current) = self.stack.try_peek().cloned() {
                self.hide(&current, op).await;
            }
        }

        if let Err(error) = self.presenter.show_page(&entry, op, cancel).await {
            self.restore(previous, &id, op).await;
            return Err(error);
        }

        if !reshow {
            self.stack.push(id.clone());
        }
        Ok(Outcome::Shown(id))
    }

    pub async fn replace(&mut self, id: PageId, cancel: &CancellationToken) -> NavResult {
        let op = PageOperation::Replace;
        if self.already_current(&id, op) {
            return Ok(Outcome::Unchanged);
        }

        let entry = self.resolve(&id, op).await?;
        let previous = self.stack.as_slice().to_vec();

        match self.stack.try_pop() {
            Some(old) => self.hide(&old, op).await,
            None => tracing::debug!(page = %id, "No page to replace, showing on empty stack"),
        }

        if let Err(error) = self.presenter.show_page(&entry, op, cancel).await {
            self.restore(previous, &id, op).await;
            return Err(error);
        }

        self.stack.push(id.clone());
        Ok(Outcome::Shown(id))
    }

    pub async fn back(&mut self, cancel: &CancellationToken) -> NavResult {
        let op = PageOperation::Back;
        let previous = self.stack.as_slice().to_vec();

        let Some(popped) = self.stack.try_pop() else {
            tracing::debug!("No page to go back to");
            return Ok(Outcome::Unchanged);
        };
        self.hide(&popped, op).await;

        let Some(next) = self.stack.try_peek().cloned() else {
            tracing::debug!(page = %popped, "No next page to show after going back");
            return Ok(Outcome::Emptied);
        };

        let entry = match self.resolve(&next, op).await {
            Ok(entry) => entry,
            Err(error) => {
                self.restore(previous, &next, op).await;
                return Err(error);
            }
        };

        if let Err(error) = self.presenter.show_page(&entry, op, cancel).await {
            self.restore(previous, &next, op).await;
            return Err(error);
        }
        Ok(Outcome::Shown(next))
    }

    fn already_current(&self, id: &PageId, op: PageOperation) -> bool {
        if !self.is_current_page(id) {
            return false;
        }

        tracing::debug!(page = %id, %op, "Already on page, ignoring");
        self.errors.publish(PageError::new(
            id.clone(),
            op,
            PageErrorCode::AlreadyCurrent,
            format!("Already on page '{id}'"),
        ));
        true
    }

    async fn resolve(&self, id: &PageId, op: PageOperation) -> Result<PageEntry, PageError> {
        self.registry.resolve(id).await.map_err(|err| {
            let error = err.into_page_error(op);
            self.errors.publish(error.clone());
            error
        })
    }

    /// 隐藏离开栈顶的页面；Hide 本身是尽力而为
    async fn hide(&mut self, id: &PageId, op: PageOperation) {
        match self.registry.resolve(id).await {
            Ok(entry) => {
                self.presenter.hide_page(&entry, op);
            }
            Err(err) => tracing::warn!(page = %id, "Cannot hide page: {err}"),
        }
    }

    /// 失败回滚：恢复失败前的栈，并在需要时重新显示原栈顶
    async fn restore(&mut self, previous: Vec<PageId>, failed: &PageId, op: PageOperation) {
        if !self.rollback {
            return;
        }

        self.stack = previous.into_iter().collect();
        let Some(top) = self.stack.try_peek().cloned() else {
            return;
        };
        if top == *failed || self.presenter.is_rendering(&top) {
            return;
        }

        // 原 token 可能已被取消，恢复显示使用新的 token
        let shown = match self.registry.resolve(&top).await {
            Ok(entry) => self
                .presenter
                .show_page(&entry, op, &CancellationToken::new())
                .await
                .is_ok(),
            Err(_) => false,
        };
        if !shown {
            tracing::warn!(page = %top, "Could not restore previous page, no page is rendered");
        }
    }
}

#[async_trait]
impl Handler<NavCommand> for PageNavigator {
    type Output = NavResult;

    async fn handle(&mut self, command: NavCommand, cancel: CancellationToken) -> NavResult {
        let result = self.execute(command, &cancel).await;
        self.publish_snapshot();
        result
    }
}

/// 发布导航命令的句柄（可克隆）
#[derive(Clone, Debug)]
pub struct NavigatorHandle {
    dispatcher: Dispatcher<NavCommand, NavResult>,
    snapshot: watch::Receiver<NavigationSnapshot>,
}

impl NavigatorHandle {
    pub async fn to(&self, id: impl Into<PageId>) -> Delivery<NavResult> {
        self.to_with_cancel(id, CancellationToken::new()).await
    }

    pub async fn to_with_cancel(
        &self,
        id: impl Into<PageId>,
        cancel: CancellationToken,
    ) -> Delivery<NavResult> {
        self.dispatcher.publish(NavCommand::To(id.into()), cancel).await
    }

    pub async fn push(&self, id: impl Into<PageId>) -> Delivery<NavResult> {
        self.push_with_cancel(id, CancellationToken::new()).await
    }

    pub async fn push_with_cancel(
        &self,
        id: impl Into<PageId>,
        cancel: CancellationToken,
    ) -> Delivery<NavResult> {
        self.dispatcher.publish(NavCommand::Push(id.into()), cancel).await
    }

    pub async fn replace(&self, id: impl Into<PageId>) -> Delivery<NavResult> {
        self.replace_with_cancel(id, CancellationToken::new()).await
    }

    pub async fn replace_with_cancel(
        &self,
        id: impl Into<PageId>,
        cancel: CancellationToken,
    ) -> Delivery<NavResult> {
        self.dispatcher
            .publish(NavCommand::Replace(id.into()), cancel)
            .await
    }

    pub async fn back(&self) -> Delivery<NavResult> {
        self.back_with_cancel(CancellationToken::new()).await
    }

    pub async fn back_with_cancel(&self, cancel: CancellationToken) -> Delivery<NavResult> {
        self.dispatcher.publish(NavCommand::Back, cancel).await
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_current_page(&self, id: &str) -> bool {
        self.snapshot.borrow().is_current_page(id)
    }

    pub fn close(&self) {
        self.dispatcher.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{FailureMode, MockPage, Page};
    use std::time::Duration;

    fn navigator(pages: &[Arc<MockPage>]) -> PageNavigator {
        let mut registry = PageRegistry::new();
        for page in pages {
            registry.register_eager(page.id(), page.clone()).unwrap();
        }
        let errors = PageErrorBus::default();
        PageNavigator::new(
            Arc::new(registry),
            PagePresenter::new(errors.clone()),
            errors,
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn ids(navigator: &PageNavigator) -> Vec<&str> {
        navigator.stack().as_slice().iter().map(PageId::as_str).collect()
    }

    #[tokio::test]
    async fn test_to_push_replace_back() {
        let (a, b, c) = (MockPage::new("a"), MockPage::new("b"), MockPage::new("c"));
        let mut nav = navigator(&[a.clone(), b.clone(), c.clone()]);
        let cancel = CancellationToken::new();

        assert_eq!(nav.to("a".into(), &cancel).await.unwrap(), Outcome::Shown("a".into()));
        assert_eq!(nav.push("b".into(), &cancel).await.unwrap(), Outcome::Shown("b".into()));
        assert_eq!(ids(&nav), vec!["a", "b"]);

        assert_eq!(nav.replace("c".into(), &cancel).await.unwrap(), Outcome::Shown("c".into()));
        assert_eq!(ids(&nav), vec!["a", "c"]);
        settle().await;
        assert!(!b.is_visible());
        assert!(c.is_visible());

        assert_eq!(nav.back(&cancel).await.unwrap(), Outcome::Shown("a".into()));
        assert_eq!(ids(&nav), vec!["a"]);
        assert!(nav.is_current_page(&"a".into()));

        assert_eq!(nav.back(&cancel).await.unwrap(), Outcome::Emptied);
        assert!(nav.stack().is_empty());
        assert_eq!(nav.back(&cancel).await.unwrap(), Outcome::Unchanged);
    }

    #[tokio::test]
    async fn test_unknown_page_leaves_stack() {
        let a = MockPage::new("a");
        let mut nav = navigator(&[a.clone()]);
        let cancel = CancellationToken::new();
        nav.to("a".into(), &cancel).await.unwrap();

        let err = nav.push("ghost".into(), &cancel).await.unwrap_err();
        assert_eq!(err.code, PageErrorCode::NotFound);
        assert_eq!(err.operation, PageOperation::Push);
        assert_eq!(ids(&nav), vec!["a"]);
        assert!(nav.is_current_page(&"a".into()));
        assert_eq!(a.hide_count(), 0);
    }

    #[tokio::test]
    async fn test_push_failure_restores_previous_top() {
        let a = MockPage::new("a");
        let broken = MockPage::failing("broken", FailureMode::ShowFails);
        let mut nav = navigator(&[a.clone(), broken.clone()]);
        let cancel = CancellationToken::new();
        nav.to("a".into(), &cancel).await.unwrap();

        let err = nav.push("broken".into(), &cancel).await.unwrap_err();
        assert_eq!(err.code, PageErrorCode::ShowFailed);
        assert_eq!(ids(&nav), vec!["a"]);
        assert!(nav.is_current_page(&"a".into()));
        settle().await;
        assert!(a.is_visible());
        assert!(!broken.is_visible());
    }

    #[tokio::test]
    async fn test_failure_without_rollback() {
        let a = MockPage::new("a");
        let broken = MockPage::failing("broken", FailureMode::ShowFails);
        let mut nav = navigator(&[a.clone(), broken.clone()]).with_rollback(false);
        let cancel = CancellationToken::new();
        nav.to("a".into(), &cancel).await.unwrap();

        nav.to("broken".into(), &cancel).await.unwrap_err();
        assert!(nav.stack().is_empty());
        assert!(nav.presenter().rendering().is_empty());
    }

    #[tokio::test]
    async fn test_push_reshows_unrendered_top() {
        let a = MockPage::new("a");
        let b = MockPage::new("b");
        let mut nav = navigator(&[a.clone(), b.clone()]).with_rollback(false);
        let cancel = CancellationToken::new();
        nav.to("a".into(), &cancel).await.unwrap();
        nav.push("b".into(), &cancel).await.unwrap();

        a.set_mode(FailureMode::ShowFails);
        nav.back(&cancel).await.unwrap_err();
        assert_eq!(ids(&nav), vec!["a"]);
        assert!(!nav.is_current_page(&"a".into()));

        a.set_mode(FailureMode::None);
        assert_eq!(nav.push("a".into(), &cancel).await.unwrap(), Outcome::Shown("a".into()));
        assert_eq!(ids(&nav), vec!["a"]);
        assert!(nav.is_current_page(&"a".into()));
    }

    #[tokio::test]
    async fn test_snapshot_tracks_state() {
        let a = MockPage::new("a");
        let mut nav = navigator(&[a]);
        nav.to("a".into(), &CancellationToken::new()).await.unwrap();

        let snapshot = nav.snapshot();
        assert_eq!(snapshot.top().map(PageId::as_str), Some("a"));
        assert!(snapshot.is_current_page("a"));
        assert!(!snapshot.is_current_page("b"));
    }
}
