//! 导航构建器：统一的注册与初始化逻辑
//!
//! 取代全局单例：注册表、Presenter、Navigator 在这里一次性构建并连好线，得到一个显式传递的
//! [`Navigation`] 上下文对象。

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::{NavigationSection, PageSource, PageSpec};
use crate::core::error::{PageError, RegistryError};
use crate::core::events::PageErrorBus;
use crate::core::shutdown::ShutdownCleanup;
use crate::navigation::{NavigationSnapshot, NavigatorHandle, PageNavigator, PagePresenter, PageRegistry};
use crate::page::{Page, PageId, PageLoader};

/// 导航构建器：先注册页面，再 `build` 启动 Navigator
pub struct NavigationBuilder {
    settings: NavigationSection,
    registry: PageRegistry,
    loader: Option<Arc<dyn PageLoader>>,
}

impl NavigationBuilder {
    pub fn new(settings: NavigationSection) -> Self {
        Self {
            settings,
            registry: PageRegistry::new(),
            loader: None,
        }
    }

    /// 设置懒加载页面使用的资源加载器
    pub fn with_loader(mut self, loader: Arc<dyn PageLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// 注册已有实例
    pub fn in_memory(
        mut self,
        id: impl Into<PageId>,
        page: Arc<dyn Page>,
    ) -> Result<Self, RegistryError> {
        self.registry.register_eager(id, page)?;
        Ok(self)
    }

    /// 注册由工厂构造的实例
    pub fn in_memory_with<F>(mut self, id: impl Into<PageId>, factory: F) -> Result<Self, RegistryError>
    where
        F: FnOnce() -> Arc<dyn Page>,
    {
        self.registry.register_factory(id, factory)?;
        Ok(self)
    }

    /// 注册懒加载页面（需先 `with_loader`）
    pub fn lazy(self, id: impl Into<PageId>, key: impl Into<String>) -> Result<Self, RegistryError> {
        self.register_lazy(id.into(), key.into(), None)
    }

    /// 注册挂在 `parent` 下的懒加载页面
    pub fn lazy_with_parent(
        self,
        id: impl Into<PageId>,
        key: impl Into<String>,
        parent: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        self.register_lazy(id.into(), key.into(), Some(parent.into()))
    }

    fn register_lazy(
        mut self,
        id: PageId,
        key: String,
        parent: Option<String>,
    ) -> Result<Self, RegistryError> {
        let loader = self
            .loader
            .clone()
            .ok_or_else(|| RegistryError::MissingLoader(id.clone()))?;
        self.registry.register_lazy(id, key, parent, loader)?;
        Ok(self)
    }

    /// 按配置中的 [[pages]] 注册；内存页面由 `make_page` 构造
    pub fn register_specs<F>(mut self, specs: &[PageSpec], mut make_page: F) -> Result<Self, RegistryError>
    where
        F: FnMut(&PageSpec) -> Arc<dyn Page>,
    {
        for spec in specs {
            self = match spec.source {
                PageSource::Memory => self.in_memory_with(spec.id.as_str(), || make_page(spec))?,
                PageSource::Lazy => self.register_lazy(
                    PageId::from(spec.id.as_str()),
                    spec.loader_key().to_string(),
                    spec.parent.clone(),
                )?,
            };
        }
        Ok(self)
    }

    /// 绑定内存页面的命令通道、初始化 Presenter（所有已注册页面置为隐藏）并启动 Navigator Actor
    ///
    /// 注册方法都是同步的、不需要运行时；只有这里需要在 tokio 运行时内执行。
    pub async fn build(self) -> Navigation {
        let errors = PageErrorBus::new(self.settings.error_capacity);
        let registry = Arc::new(self.registry);

        let presenter = PagePresenter::new(errors.clone())
            .with_show_timeout(self.settings.show_timeout())
            .with_hide_timeout(self.settings.hide_timeout());
        let mut navigator = PageNavigator::new(registry.clone(), presenter, errors.clone())
            .with_rollback(self.settings.rollback_on_failure);
        navigator.initialize().await;

        tracing::debug!(
            pages = registry.entries().await.len(),
            rollback = self.settings.rollback_on_failure,
            "navigation built"
        );

        Navigation {
            navigator: navigator.spawn(),
            registry,
            errors,
        }
    }
}

/// 导航上下文：持有 Navigator 句柄、注册表与错误总线
pub struct Navigation {
    navigator: NavigatorHandle,
    registry: Arc<PageRegistry>,
    errors: PageErrorBus,
}

impl Navigation {
    pub fn navigator(&self) -> &NavigatorHandle {
        &self.navigator
    }

    pub fn registry(&self) -> &Arc<PageRegistry> {
        &self.registry
    }

    /// 订阅 PageError 事件
    pub fn subscribe_errors(&self) -> broadcast::Receiver<PageError> {
        self.errors.subscribe()
    }

    pub fn error_bus(&self) -> &PageErrorBus {
        &self.errors
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        self.navigator.snapshot()
    }

    pub fn is_current_page(&self, id: &str) -> bool {
        self.navigator.is_current_page(id)
    }

    /// 供关闭协调器使用的清理任务
    pub fn cleanup(&self) -> NavigationCleanup {
        NavigationCleanup {
            navigator: self.navigator.clone(),
            registry: self.registry.clone(),
        }
    }
}

/// 关闭时停止 Navigator、释放页面资源
pub struct NavigationCleanup {
    navigator: NavigatorHandle,
    registry: Arc<PageRegistry>,
}

#[async_trait::async_trait]
impl ShutdownCleanup for NavigationCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.navigator.close();
        self.registry.dispose().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Navigation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{MockLoader, MockPage};

    #[tokio::test]
    async fn test_lazy_without_loader_fails() {
        let result = NavigationBuilder::new(NavigationSection::default()).lazy("shop", "pages/shop");
        assert!(matches!(result, Err(RegistryError::MissingLoader(id)) if id.as_str() == "shop"));
    }

    #[test]
    fn test_register_outside_runtime() {
        let specs = vec![PageSpec {
            id: "about".into(),
            source: PageSource::Memory,
            key: None,
            parent: None,
        }];
        let builder = NavigationBuilder::new(NavigationSection::default())
            .in_memory("home", MockPage::new("home"))
            .unwrap()
            .in_memory_with("shop", || -> Arc<dyn Page> { MockPage::new("shop") })
            .unwrap()
            .register_specs(&specs, |spec| -> Arc<dyn Page> { MockPage::new(spec.id.clone()) })
            .unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let navigation = builder.build().await;
            assert_eq!(navigation.registry().entries().await.len(), 3);
            assert!(navigation.registry().is_resolved(&PageId::from("about")).await);
        });
    }

    #[tokio::test]
    async fn test_build_initializes_pages_hidden() {
        let home = MockPage::new("home");
        home.set_visible(true);

        let navigation = NavigationBuilder::new(NavigationSection::default())
            .in_memory("home", home.clone())
            .unwrap()
            .build()
            .await;

        assert!(!home.is_visible());
        assert!(navigation.snapshot().stack.is_empty());
    }

    #[tokio::test]
    async fn test_register_specs() {
        let loader = MockLoader::new();
        let specs = vec![
            PageSpec {
                id: "home".into(),
                source: PageSource::Memory,
                key: None,
                parent: None,
            },
            PageSpec {
                id: "shop".into(),
                source: PageSource::Lazy,
                key: Some("pages/shop".into()),
                parent: None,
            },
        ];

        let navigation = NavigationBuilder::new(NavigationSection::default())
            .with_loader(loader.clone())
            .register_specs(&specs, |spec| -> Arc<dyn Page> { MockPage::new(spec.id.clone()) })
            .unwrap()
            .build()
            .await;

        let registry = navigation.registry();
        assert!(registry.is_resolved(&PageId::from("home")).await);
        assert!(registry.contains(&PageId::from("shop")).await);
        assert!(!registry.is_resolved(&PageId::from("shop")).await);
        assert_eq!(loader.instantiate_count(), 0);

        navigation.cleanup().cleanup().await.unwrap();
        assert!(!registry.contains(&PageId::from("home")).await);
    }
}
