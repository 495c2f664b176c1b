//! # Service Registry
//!
//! Maps service ids to factories and instantiates lazily with per-scope
//! memoization. Root-scoped services cache one instance per process;
//! plugin-scoped services cache one instance per plugin id.
//!
//! The instance cache is the only shared mutable state reached during
//! parallel plugin initialization, so instantiation is guarded by per-key
//! single-flight cells: when two resolutions race on the same uncached
//! key, exactly one runs the factory and both receive the same instance.

use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use shared_types::{
    FactoryContext, ServiceDependencies, ServiceFactory, ServiceInstance, ServiceRef,
    ServiceScope, WiringError, ROOT_PLUGIN_ID,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Cache key for one memoized instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InstanceKey {
    Root(String),
    Plugin(String, String),
}

/// Factory table plus memoized instances.
pub struct ServiceRegistry {
    factories: RwLock<HashMap<String, Arc<ServiceFactory>>>,
    cells: DashMap<InstanceKey, Arc<OnceCell<ServiceInstance>>>,
}

impl ServiceRegistry {
    /// Build a registry from an initial factory list. Later entries win
    /// over earlier ones for the same service id, which is what lets user
    /// overrides shadow defaults.
    #[must_use]
    pub fn new(factories: Vec<ServiceFactory>) -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
            cells: DashMap::new(),
        };
        registry.extend(factories);
        registry
    }

    /// Append more factories, last write winning per service id. Only
    /// meaningful before instantiation of the affected services begins;
    /// the startup sequence extends the registry with overrides and
    /// discovered factories before the root service phase.
    pub fn extend(&self, factories: Vec<ServiceFactory>) {
        let mut map = self.factories.write();
        for factory in factories {
            map.insert(factory.service().id().to_string(), Arc::new(factory));
        }
    }

    /// Every service reference known to the registry.
    #[must_use]
    pub fn service_refs(&self) -> Vec<ServiceRef> {
        self.factories
            .read()
            .values()
            .map(|factory| factory.service().clone())
            .collect()
    }

    /// Resolve a service for `plugin_id`.
    ///
    /// Returns `Ok(None)` when no factory is registered for the id. The
    /// factory's declared dependencies are resolved transitively under the
    /// same plugin id; a missing dependency or a factory cycle aborts the
    /// resolution.
    pub async fn get(
        &self,
        service_ref: &ServiceRef,
        plugin_id: &str,
    ) -> Result<Option<ServiceInstance>, WiringError> {
        self.resolve(service_ref.id(), plugin_id, &[]).await
    }

    /// Resolve by bare id. Init dependencies arrive as ids; the factory's
    /// registered scope decides the cache key, not the caller's reference.
    pub async fn get_by_id(
        &self,
        service_id: &str,
        plugin_id: &str,
    ) -> Result<Option<ServiceInstance>, WiringError> {
        self.resolve(service_id, plugin_id, &[]).await
    }

    fn resolve<'a>(
        &'a self,
        service_id: &'a str,
        plugin_id: &'a str,
        path: &'a [String],
    ) -> BoxFuture<'a, Result<Option<ServiceInstance>, WiringError>> {
        Box::pin(async move {
            let factory = { self.factories.read().get(service_id).cloned() };
            let Some(factory) = factory else {
                return Ok(None);
            };

            let (key, effective_plugin) = match factory.service().scope() {
                ServiceScope::Root => (InstanceKey::Root(service_id.to_string()), ROOT_PLUGIN_ID),
                ServiceScope::Plugin => (
                    InstanceKey::Plugin(service_id.to_string(), plugin_id.to_string()),
                    plugin_id,
                ),
            };

            let cell = self
                .cells
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            if let Some(instance) = cell.get() {
                return Ok(Some(instance.clone()));
            }

            if path.iter().any(|id| id == service_id) {
                let mut cycle: Vec<&str> = path.iter().map(String::as_str).collect();
                cycle.push(service_id);
                return Err(WiringError::ServiceCycle {
                    service_id: service_id.to_string(),
                    path: cycle.join(" -> "),
                });
            }

            let instance = cell
                .get_or_try_init(|| async {
                    let mut next_path = path.to_vec();
                    next_path.push(service_id.to_string());

                    let mut deps = ServiceDependencies::new();
                    for dep in factory.dependencies() {
                        match self.resolve(dep.id(), effective_plugin, &next_path).await? {
                            Some(instance) => {
                                deps.insert(dep.id().to_string(), instance);
                            }
                            None => {
                                return Err(WiringError::MissingServiceDependency {
                                    service_id: service_id.to_string(),
                                    dependency_id: dep.id().to_string(),
                                });
                            }
                        }
                    }

                    debug!(service_id, plugin_id = effective_plugin, "instantiating service");
                    factory
                        .instantiate(FactoryContext {
                            deps,
                            plugin_id: effective_plugin.to_string(),
                        })
                        .await
                        .map_err(|source| WiringError::ServiceFactoryFailed {
                            service_id: service_id.to_string(),
                            source,
                        })
                })
                .await?;

            Ok(Some(instance.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_factory(service: ServiceRef, counter: Arc<AtomicUsize>) -> ServiceFactory {
        ServiceFactory::new(service, Vec::new(), move |ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ServiceInstance::new(ctx.plugin_id))
            }
        })
    }

    #[tokio::test]
    async fn test_unknown_service_resolves_to_none() {
        let registry = ServiceRegistry::new(Vec::new());
        let result = registry.get(&ServiceRef::root("nope"), ROOT_PLUGIN_ID).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_root_scope_is_memoized_per_process() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = ServiceRegistry::new(vec![counting_factory(
            ServiceRef::root("db"),
            Arc::clone(&counter),
        )]);

        registry.get_by_id("db", ROOT_PLUGIN_ID).await.unwrap();
        // A plugin asking for a root service shares the process instance.
        registry.get_by_id("db", "catalog").await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plugin_scope_is_memoized_per_plugin() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = ServiceRegistry::new(vec![counting_factory(
            ServiceRef::plugin_scoped("cache"),
            Arc::clone(&counter),
        )]);

        let a1 = registry.get_by_id("cache", "a").await.unwrap().unwrap();
        let a2 = registry.get_by_id("cache", "a").await.unwrap().unwrap();
        let b = registry.get_by_id("cache", "b").await.unwrap().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(a1.downcast::<String>(), a2.downcast::<String>());
        assert_eq!(b.downcast::<String>().as_deref(), Some(&"b".to_string()));
    }

    #[tokio::test]
    async fn test_last_factory_wins_per_id() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let registry = ServiceRegistry::new(vec![
            counting_factory(ServiceRef::root("db"), Arc::clone(&first)),
            counting_factory(ServiceRef::root("db"), Arc::clone(&second)),
        ]);

        registry.get_by_id("db", ROOT_PLUGIN_ID).await.unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_dependency_is_reported() {
        let registry = ServiceRegistry::new(vec![ServiceFactory::new(
            ServiceRef::root("api"),
            vec![ServiceRef::root("db")],
            |_| async { Ok(ServiceInstance::new(())) },
        )]);

        let error = registry.get_by_id("api", ROOT_PLUGIN_ID).await.unwrap_err();
        assert!(matches!(
            error,
            WiringError::MissingServiceDependency { service_id, dependency_id }
                if service_id == "api" && dependency_id == "db"
        ));
    }

    #[tokio::test]
    async fn test_factory_cycle_is_reported_with_path() {
        let registry = ServiceRegistry::new(vec![
            ServiceFactory::new(
                ServiceRef::root("a"),
                vec![ServiceRef::root("b")],
                |_| async { Ok(ServiceInstance::new(())) },
            ),
            ServiceFactory::new(
                ServiceRef::root("b"),
                vec![ServiceRef::root("a")],
                |_| async { Ok(ServiceInstance::new(())) },
            ),
        ]);

        let error = registry.get_by_id("a", ROOT_PLUGIN_ID).await.unwrap_err();
        match error {
            WiringError::ServiceCycle { service_id, path } => {
                assert_eq!(service_id, "a");
                assert_eq!(path, "a -> b -> a");
            }
            other => panic!("expected ServiceCycle, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_resolution_invokes_factory_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let invocations = Arc::clone(&counter);
        let registry = Arc::new(ServiceRegistry::new(vec![ServiceFactory::new(
            ServiceRef::root("slow"),
            Vec::new(),
            move |_| {
                let invocations = Arc::clone(&invocations);
                async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(ServiceInstance::new(7_u64))
                }
            },
        )]));

        let left = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_by_id("slow", ROOT_PLUGIN_ID).await })
        };
        let right = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_by_id("slow", ROOT_PLUGIN_ID).await })
        };

        let left = left.await.unwrap().unwrap().unwrap();
        let right = right.await.unwrap().unwrap().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(left.downcast::<u64>(), right.downcast::<u64>());
    }
}
