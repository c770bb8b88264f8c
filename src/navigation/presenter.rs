//! Presenter：通过页面私有通道发出 Show / Hide，并维护渲染集合
//!
//! Show 等待页面确认，成功后才记入渲染集合；Hide 是发出即返回，失败只上报 `HideFailed`。
//! Presenter 运行在 Navigator 的 Actor 内部，不单独加锁。

use std::collections::BTreeSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::dispatch::{Delivery, Submission};
use crate::core::error::{PageError, PageErrorCode, PageOperation};
use crate::core::events::PageErrorBus;
use crate::page::{PageCommand, PageEntry, PageFault, PageId};

pub struct PagePresenter {
    rendering: BTreeSet<PageId>,
    errors: PageErrorBus,
    show_timeout: Option<Duration>,
    hide_timeout: Option<Duration>,
}

impl PagePresenter {
    pub fn new(errors: PageErrorBus) -> Self {
        Self {
            rendering: BTreeSet::new(),
            errors,
            show_timeout: None,
            hide_timeout: None,
        }
    }

    /// Show 超时后按 `Timeout` 失败处理
    pub fn with_show_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.show_timeout = timeout;
        self
    }

    pub fn with_hide_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.hide_timeout = timeout;
        self
    }

    /// 启动时调用一次：所有已知页面置为隐藏，清空渲染集合
    pub fn initialize(&mut self, entries: &[PageEntry]) {
        for entry in entries {
            entry.page.set_visible(false);
        }
        self.rendering.clear();
    }

    /// 显示页面并等待确认；失败时发布错误、通知页面，渲染集合保持不变
    pub async fn show_page(
        &mut self,
        entry: &PageEntry,
        operation: PageOperation,
        cancel: &CancellationToken,
    ) -> Result<(), PageError> {
        let id = &entry.id;
        let token = cancel.child_token();
        let publish = entry.channel.publish(PageCommand::Show, token.clone());

        let delivery = match self.show_timeout {
            Some(limit) => match tokio::time::timeout(limit, publish).await {
                Ok(delivery) => delivery,
                Err(_) => {
                    token.cancel();
                    let error = PageError::new(
                        id.clone(),
                        operation,
                        PageErrorCode::Timeout,
                        format!("Show of page '{id}' timed out after {}ms", limit.as_millis()),
                    );
                    return Err(self.fail(entry, error));
                }
            },
            None => publish.await,
        };

        let error = match delivery {
            Delivery::Completed(Ok(())) => {
                self.rendering.insert(id.clone());
                return Ok(());
            }
            Delivery::Completed(Err(PageFault::Failed(cause))) => PageError::new(
                id.clone(),
                operation,
                PageErrorCode::ShowFailed,
                format!("Failed to show page '{id}'"),
            )
            .with_cause(cause),
            Delivery::Completed(Err(PageFault::Cancelled)) | Delivery::Cancelled => {
                PageError::new(
                    id.clone(),
                    operation,
                    PageErrorCode::ShowFailed,
                    format!("Show of page '{id}' was cancelled"),
                )
            }
            Delivery::Dropped => PageError::new(
                id.clone(),
                operation,
                PageErrorCode::ShowFailed,
                format!("Show of page '{id}' dropped: another show is being handled"),
            ),
            Delivery::Closed => PageError::new(
                id.clone(),
                operation,
                PageErrorCode::ShowFailed,
                format!("Channel of page '{id}' is closed"),
            ),
        };
        Err(self.fail(entry, error))
    }

    fn fail(&self, entry: &PageEntry, error: PageError) -> PageError {
        // 页面可能已在过渡中途变为可见，交给它自己复位
        let _ = entry.channel.submit(
            PageCommand::Error(error.clone()),
            CancellationToken::new(),
        );
        self.errors.publish(error.clone());
        error
    }

    /// 隐藏页面（仅当它在渲染集合中）；返回是否发出了 Hide
    pub fn hide_page(&mut self, entry: &PageEntry, operation: PageOperation) -> bool {
        if !self.rendering.remove(&entry.id) {
            return false;
        }

        let id = entry.id.clone();
        match entry.channel.submit(PageCommand::Hide, CancellationToken::new()) {
            Submission::Accepted(rx) => {
                let errors = self.errors.clone();
                let limit = self.hide_timeout;
                tokio::spawn(async move {
                    let outcome = match limit {
                        Some(limit) => tokio::time::timeout(limit, rx).await.ok(),
                        None => Some(rx.await),
                    };
                    let error = match outcome {
                        Some(Ok(Ok(()))) => return,
                        Some(Ok(Err(fault))) => PageError::new(
                            id.clone(),
                            operation,
                            PageErrorCode::HideFailed,
                            format!("Failed to hide page '{id}'"),
                        )
                        .with_cause(fault),
                        Some(Err(_)) => PageError::new(
                            id.clone(),
                            operation,
                            PageErrorCode::HideFailed,
                            format!("Channel of page '{id}' closed before hide completed"),
                        ),
                        None => PageError::new(
                            id.clone(),
                            operation,
                            PageErrorCode::Timeout,
                            format!("Hide of page '{id}' timed out"),
                        ),
                    };
                    tracing::warn!(page = %id, "{error}, page may stay visible next to the current one");
                    errors.publish(error);
                });
            }
            Submission::Dropped => {
                tracing::debug!(page = %id, "hide already being handled");
            }
            Submission::Closed => {
                let error = PageError::new(
                    id.clone(),
                    operation,
                    PageErrorCode::HideFailed,
                    format!("Channel of page '{id}' is closed"),
                );
                tracing::warn!(page = %id, "{error}");
                self.errors.publish(error);
            }
        }
        true
    }

    pub fn is_rendering(&self, id: &PageId) -> bool {
        self.rendering.contains(id)
    }

    pub fn rendering(&self) -> &BTreeSet<PageId> {
        &self.rendering
    }
}
