//! 核心层：错误类型、错误事件总线、带丢弃语义的命令分发、构建器与优雅关闭

pub mod builder;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod shutdown;

pub use builder::{Navigation, NavigationBuilder, NavigationCleanup};
pub use dispatch::{Command, Delivery, Dispatcher, Handler, Submission};
pub use error::{PageError, PageErrorCode, PageOperation, RegistryError, ResolveError, StackError};
pub use events::PageErrorBus;
pub use shutdown::{CleanupReport, ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason};
