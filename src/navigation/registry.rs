//! 页面注册表：PageId → 可用的 PageEntry
//!
//! - eager：已解析的页面（内存注册的页面 + 已完成懒加载的页面）。内存页面在注册时只保存实例，
//!   命令通道在首次解析时才绑定，因此注册本身不依赖 tokio 运行时
//! - pending：尚未实例化的懒加载页面，每个持有一个 `OnceCell`，首个调用方触发加载，
//!   并发调用方等待同一结果，保证每个 ID 最多实例化一次
//!
//! 注册只在构建阶段进行（`&mut self`）；解析与销毁在运行期通过内部锁完成。
//! 同时持有两把锁时总是先 eager 后 pending。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, RwLock};

use crate::core::error::{RegistryError, ResolveError};
use crate::page::{Page, PageEntry, PageId, PageLoader, ResourceHandle};

/// 已解析的页面：通道尚未绑定，或已绑定
enum EagerPage {
    Unbound(Arc<dyn Page>),
    Bound(PageEntry),
}

impl EagerPage {
    /// 需要时绑定通道（需在 tokio 运行时内调用）
    fn bind(&mut self, id: &PageId) -> PageEntry {
        match self {
            Self::Bound(entry) => entry.clone(),
            Self::Unbound(page) => {
                let entry = PageEntry::bind(id.clone(), page.clone());
                *self = Self::Bound(entry.clone());
                entry
            }
        }
    }
}

/// 尚未实例化的懒加载页面
struct LazyPage {
    key: String,
    parent: Option<String>,
    loader: Arc<dyn PageLoader>,
    cell: OnceCell<Arc<dyn Page>>,
}

/// 已加载的资源句柄及其加载器（销毁时交还）
struct LoadedResource {
    loader: Arc<dyn PageLoader>,
    handle: ResourceHandle,
}

#[derive(Default)]
pub struct PageRegistry {
    eager: RwLock<HashMap<PageId, EagerPage>>,
    pending: RwLock<HashMap<PageId, Arc<LazyPage>>>,
    loaded: Mutex<Vec<LoadedResource>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_new_id(&mut self, id: &PageId) -> Result<(), RegistryError> {
        if id.is_empty() {
            return Err(RegistryError::EmptyId);
        }
        if self.eager.get_mut().contains_key(id) || self.pending.get_mut().contains_key(id) {
            return Err(RegistryError::Duplicate(id.clone()));
        }
        Ok(())
    }

    /// 注册已实例化的页面；命令通道在首次解析时绑定
    pub fn register_eager(
        &mut self,
        id: impl Into<PageId>,
        page: Arc<dyn Page>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        self.check_new_id(&id)?;
        self.eager.get_mut().insert(id, EagerPage::Unbound(page));
        Ok(())
    }

    /// 注册由工厂构造的页面；ID 校验通过后才调用工厂
    pub fn register_factory<F>(&mut self, id: impl Into<PageId>, factory: F) -> Result<(), RegistryError>
    where
        F: FnOnce() -> Arc<dyn Page>,
    {
        let id = id.into();
        self.check_new_id(&id)?;
        self.register_eager(id, factory())
    }

    /// 注册懒加载页面：首次解析时通过 `loader` 实例化
    pub fn register_lazy(
        &mut self,
        id: impl Into<PageId>,
        key: impl Into<String>,
        parent: Option<String>,
        loader: Arc<dyn PageLoader>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        self.check_new_id(&id)?;
        let key = key.into();
        if key.trim().is_empty() {
            return Err(RegistryError::EmptyKey(id));
        }

        self.pending.get_mut().insert(
            id,
            Arc::new(LazyPage {
                key,
                parent,
                loader,
                cell: OnceCell::new(),
            }),
        );
        Ok(())
    }

    /// 解析页面：eager 直接返回（必要时绑定通道）；pending 则加载（或等待进行中的加载）后提升为 eager
    pub async fn resolve(&self, id: &PageId) -> Result<PageEntry, ResolveError> {
        if let Some(EagerPage::Bound(entry)) = self.eager.read().await.get(id) {
            return Ok(entry.clone());
        }
        if let Some(slot) = self.eager.write().await.get_mut(id) {
            return Ok(slot.bind(id));
        }

        let lazy = self.pending.read().await.get(id).cloned();
        let Some(lazy) = lazy else {
            // 两次读之间可能已被其他调用方提升
            return match self.eager.write().await.get_mut(id) {
                Some(slot) => Ok(slot.bind(id)),
                None => Err(ResolveError::NotFound(id.clone())),
            };
        };

        let page = lazy
            .cell
            .get_or_try_init(|| self.instantiate(id, &lazy))
            .await
            .map_err(|cause| ResolveError::LoadFailed {
                id: id.clone(),
                cause: Arc::new(cause),
            })?
            .clone();

        // 插入 eager 与移出 pending 在同一临界区内完成，外部不会看到 ID 同时出现在两张表中
        let mut eager = self.eager.write().await;
        let mut pending = self.pending.write().await;
        let entry = eager
            .entry(id.clone())
            .or_insert_with(|| EagerPage::Unbound(page))
            .bind(id);
        pending.remove(id);
        Ok(entry)
    }

    async fn instantiate(&self, id: &PageId, lazy: &LazyPage) -> anyhow::Result<Arc<dyn Page>> {
        tracing::debug!(page = %id, key = %lazy.key, "instantiating lazy page");
        let loaded = lazy
            .loader
            .instantiate(&lazy.key, lazy.parent.as_deref())
            .await?;
        self.loaded.lock().await.push(LoadedResource {
            loader: lazy.loader.clone(),
            handle: loaded.handle,
        });
        Ok(loaded.page)
    }

    pub async fn contains(&self, id: &PageId) -> bool {
        let eager = self.eager.read().await;
        let pending = self.pending.read().await;
        eager.contains_key(id) || pending.contains_key(id)
    }

    /// 是否已解析（在 eager 中）
    pub async fn is_resolved(&self, id: &PageId) -> bool {
        self.eager.read().await.contains_key(id)
    }

    /// 当前所有已解析条目（尚未绑定通道的页面在此绑定）
    pub async fn entries(&self) -> Vec<PageEntry> {
        self.eager
            .write()
            .await
            .iter_mut()
            .map(|(id, slot)| slot.bind(id))
            .collect()
    }

    /// 释放所有已加载资源与条目通道，清空两张表
    pub async fn dispose(&self) {
        let loaded: Vec<LoadedResource> = self.loaded.lock().await.drain(..).collect();
        for resource in &loaded {
            resource.loader.release(&resource.handle);
        }

        let mut eager = self.eager.write().await;
        let mut pending = self.pending.write().await;
        let mut closed = 0;
        for (_, slot) in eager.drain() {
            if let EagerPage::Bound(entry) = slot {
                entry.dispose();
                closed += 1;
            }
        }
        pending.clear();

        tracing::debug!(
            released = loaded.len(),
            channels = closed,
            "page registry disposed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{MockLoader, MockPage};

    #[tokio::test]
    async fn test_register_rejects_empty_and_duplicate() {
        let mut registry = PageRegistry::new();
        let loader = MockLoader::new();

        assert_eq!(
            registry.register_eager("", MockPage::new("")),
            Err(RegistryError::EmptyId)
        );
        registry.register_eager("home", MockPage::new("home")).unwrap();
        assert_eq!(
            registry.register_eager("home", MockPage::new("home")),
            Err(RegistryError::Duplicate(PageId::from("home")))
        );
        assert_eq!(
            registry.register_lazy("home", "pages/home", None, loader.clone()),
            Err(RegistryError::Duplicate(PageId::from("home")))
        );
        assert_eq!(
            registry.register_lazy("settings", " ", None, loader),
            Err(RegistryError::EmptyKey(PageId::from("settings")))
        );
    }

    #[test]
    fn test_register_without_runtime() {
        let mut registry = PageRegistry::new();
        registry.register_eager("home", MockPage::new("home")).unwrap();
        registry
            .register_factory("about", || -> Arc<dyn Page> { MockPage::new("about") })
            .unwrap();
        registry
            .register_lazy("settings", "pages/settings", None, MockLoader::new())
            .unwrap();
    }

    #[tokio::test]
    async fn test_eager_channel_bound_once() {
        let mut registry = PageRegistry::new();
        registry.register_eager("home", MockPage::new("home")).unwrap();
        let id = PageId::from("home");

        let first = registry.resolve(&id).await.unwrap();
        let second = registry.resolve(&id).await.unwrap();
        first.channel.close();
        assert!(second.channel.is_closed());
        assert_eq!(registry.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_factory_not_called_for_rejected_id() {
        let mut registry = PageRegistry::new();
        registry.register_eager("home", MockPage::new("home")).unwrap();

        let mut called = false;
        let result = registry.register_factory("home", || -> Arc<dyn Page> {
            called = true;
            MockPage::new("home")
        });
        assert!(result.is_err());
        assert!(!called);
    }

    #[tokio::test]
    async fn test_resolve_eager_and_unknown() {
        let mut registry = PageRegistry::new();
        registry.register_eager("home", MockPage::new("home")).unwrap();

        let entry = registry.resolve(&PageId::from("home")).await.unwrap();
        assert_eq!(entry.id.as_str(), "home");

        let missing = registry.resolve(&PageId::from("nope")).await;
        assert!(matches!(missing, Err(ResolveError::NotFound(id)) if id.as_str() == "nope"));
    }

    #[tokio::test]
    async fn test_lazy_page_promoted_once() {
        let mut registry = PageRegistry::new();
        let loader = MockLoader::new();
        registry
            .register_lazy("settings", "pages/settings", Some("root".into()), loader.clone())
            .unwrap();
        let id = PageId::from("settings");

        assert!(registry.contains(&id).await);
        assert!(!registry.is_resolved(&id).await);

        registry.resolve(&id).await.unwrap();
        registry.resolve(&id).await.unwrap();

        assert_eq!(loader.instantiate_count(), 1);
        assert!(registry.is_resolved(&id).await);
        assert!(!registry.pending.read().await.contains_key(&id));
        assert_eq!(registry.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolve_instantiates_once() {
        let mut registry = PageRegistry::new();
        let loader = MockLoader::new();
        loader.set_delay(Some(std::time::Duration::from_millis(20)));
        registry
            .register_lazy("settings", "pages/settings", None, loader.clone())
            .unwrap();
        let registry = Arc::new(registry);
        let id = PageId::from("settings");

        let (a, b) = tokio::join!(registry.resolve(&id), registry.resolve(&id));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(loader.instantiate_count(), 1);
        assert!(Arc::ptr_eq(&a.page, &b.page));
        assert!(!registry.pending.read().await.contains_key(&id));
        assert!(registry.eager.read().await.contains_key(&id));
    }

    #[tokio::test]
    async fn test_load_failure_not_promoted() {
        let mut registry = PageRegistry::new();
        let loader = MockLoader::new();
        loader.fail_key("pages/broken");
        registry
            .register_lazy("broken", "pages/broken", None, loader.clone())
            .unwrap();
        let id = PageId::from("broken");

        let result = registry.resolve(&id).await;
        assert!(matches!(result, Err(ResolveError::LoadFailed { .. })));
        assert!(!registry.is_resolved(&id).await);
        assert!(registry.contains(&id).await);

        // 加载失败不会被记忆化，之后可以重试
        loader.recover_key("pages/broken");
        assert!(registry.resolve(&id).await.is_ok());
        assert_eq!(loader.instantiate_count(), 2);
    }

    #[tokio::test]
    async fn test_dispose_releases_everything() {
        let mut registry = PageRegistry::new();
        let loader = MockLoader::new();
        registry.register_eager("home", MockPage::new("home")).unwrap();
        registry
            .register_lazy("settings", "pages/settings", None, loader.clone())
            .unwrap();
        registry
            .register_lazy("about", "pages/about", None, loader.clone())
            .unwrap();

        let settings = registry.resolve(&PageId::from("settings")).await.unwrap();
        registry.dispose().await;

        assert_eq!(loader.released().len(), 1);
        assert_eq!(loader.released()[0].key, "pages/settings");
        assert!(settings.channel.is_closed());
        assert!(!registry.contains(&PageId::from("home")).await);
        assert!(!registry.contains(&PageId::from("about")).await);
    }
}
