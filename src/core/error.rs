//! 导航错误类型与错误事件
//!
//! 运行时失败（解析、Show/Hide）不会以 panic 或 `Err` 穿过分发边界，而是构造成 [`PageError`]
//! 发布到错误总线；注册阶段的非法输入（空 ID、重复 ID）直接以 [`RegistryError`] 返回给调用方。

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::page::PageId;

/// 结构化错误码（字符串形式与 `Page.*` 约定保持一致，序列化同样使用该形式）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PageErrorCode {
    /// 注册表中找不到页面
    NotFound,
    /// 懒加载页面实例化失败
    LoadFailed,
    /// 加载过程中的网络错误
    NetworkError,
    /// 注册表操作失败
    RegistryError,
    /// 对空栈执行了出栈
    EmptyStack,
    /// 页面状态或配置非法
    InvalidState,
    /// 页面操作超时
    Timeout,
    /// 无权访问页面
    PermissionDenied,
    /// 已经位于目标页面
    AlreadyCurrent,
    /// Show 执行失败
    ShowFailed,
    /// Hide 执行失败
    HideFailed,
}

impl PageErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "Page.NotFound",
            Self::LoadFailed => "Page.LoadFailed",
            Self::NetworkError => "Page.NetworkError",
            Self::RegistryError => "Page.RegistryError",
            Self::EmptyStack => "Page.EmptyStack",
            Self::InvalidState => "Page.InvalidState",
            Self::Timeout => "Page.Timeout",
            Self::PermissionDenied => "Page.PermissionDenied",
            Self::AlreadyCurrent => "Page.AlreadyCurrent",
            Self::ShowFailed => "Page.ShowFailed",
            Self::HideFailed => "Page.HideFailed",
        }
    }
}

impl fmt::Display for PageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PageErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 出错时所处的导航操作（用于错误上报）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum PageOperation {
    /// 无特定操作（如 Presenter 内部的 Show/Hide）
    #[default]
    None,
    /// 清空栈后显示新页面
    To,
    /// 压栈并显示新页面
    Push,
    /// 替换栈顶页面
    Replace,
    /// 返回上一页
    Back,
}

impl fmt::Display for PageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::To => "To",
            Self::Push => "Push",
            Self::Replace => "Replace",
            Self::Back => "Back",
        };
        f.write_str(name)
    }
}

/// 导航错误事件：在失败点构造，发布一次，不会自动重试
#[derive(Clone, Debug, Serialize)]
pub struct PageError {
    pub page_id: PageId,
    pub operation: PageOperation,
    pub code: PageErrorCode,
    pub message: String,
    /// 原始错误（不参与序列化）
    #[serde(skip)]
    pub cause: Option<Arc<anyhow::Error>>,
    /// 发生时间（毫秒时间戳）
    pub occurred_at: i64,
}

impl PageError {
    pub fn new(
        page_id: PageId,
        operation: PageOperation,
        code: PageErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            page_id,
            operation,
            code,
            message: message.into(),
            cause: None,
            occurred_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(Arc::new(cause.into()));
        self
    }

}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (page '{}', op {})",
            self.code, self.message, self.page_id, self.operation
        )?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// 注册阶段的边界校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Page ID cannot be empty")]
    EmptyId,

    #[error("Loader key cannot be empty for page '{0}'")]
    EmptyKey(PageId),

    #[error("Page with ID '{0}' already exists in the registry")]
    Duplicate(PageId),

    #[error("No page loader configured for lazy page '{0}'")]
    MissingLoader(PageId),
}

/// 页面解析失败
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("Page '{0}' not found in registry")]
    NotFound(PageId),

    #[error("Failed to load page '{id}': {cause}")]
    LoadFailed { id: PageId, cause: Arc<anyhow::Error> },
}

impl ResolveError {
    pub fn code(&self) -> PageErrorCode {
        match self {
            Self::NotFound(_) => PageErrorCode::NotFound,
            Self::LoadFailed { .. } => PageErrorCode::LoadFailed,
        }
    }

    /// 转换为可发布的错误事件
    pub fn into_page_error(self, operation: PageOperation) -> PageError {
        let message = self.to_string();
        match self {
            Self::NotFound(id) => {
                PageError::new(id, operation, PageErrorCode::NotFound, message)
            }
            Self::LoadFailed { id, cause } => {
                let mut error = PageError::new(id, operation, PageErrorCode::LoadFailed, message);
                error.cause = Some(cause);
                error
            }
        }
    }
}

/// 页面栈错误
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    #[error("Cannot pop from an empty stack")]
    Empty,
}

impl StackError {
    pub fn code(&self) -> PageErrorCode {
        PageErrorCode::EmptyStack
    }
}
