//! 懒加载页面的资源加载接口
//!
//! 具体的资源后端（远程资源包、预制体实例化等）由调用方实现；注册表只负责记忆化调用
//! `instantiate` 并在销毁时 `release` 每个已加载的句柄。

use std::sync::Arc;

use async_trait::async_trait;

use crate::page::Page;

/// 已加载资源的句柄（由加载器分配，销毁时原样交还）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub key: String,
    pub instance: u64,
}

/// 一次成功实例化的结果
pub struct LoadedPage {
    pub page: Arc<dyn Page>,
    pub handle: ResourceHandle,
}

/// 资源加载器
#[async_trait]
pub trait PageLoader: Send + Sync {
    /// 按 key 实例化页面，`parent` 为可选的挂载点
    async fn instantiate(&self, key: &str, parent: Option<&str>) -> anyhow::Result<LoadedPage>;

    /// 释放 `instantiate` 返回的句柄
    fn release(&self, handle: &ResourceHandle);
}
