//! 导航层：页面栈、注册表、Presenter 与 Navigator 状态机

pub mod navigator;
pub mod presenter;
pub mod registry;
pub mod stack;

pub use navigator::{NavCommand, NavResult, NavigationSnapshot, NavigatorHandle, Outcome, PageNavigator};
pub use presenter::PagePresenter;
pub use registry::PageRegistry;
pub use stack::PageStack;
