//! screen-nav - 基于栈的页面导航引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与错误事件、命令分发（同类命令在途即丢弃）、构建器、优雅关闭
//! - **navigation**: 页面栈、注册表（懒加载记忆化）、Presenter、Navigator 状态机
//! - **observability**: 日志初始化
//! - **page**: 页面契约、页面私有命令通道、加载器与演示 / 测试页面

pub mod config;
pub mod core;
pub mod navigation;
pub mod observability;
pub mod page;

pub use crate::core::{Navigation, NavigationBuilder, PageError, PageErrorCode, PageOperation};
pub use navigation::{NavCommand, NavigationSnapshot, NavigatorHandle, Outcome};
pub use page::{Page, PageId, PageLoader};
