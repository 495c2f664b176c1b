//! # Service Factories
//!
//! A [`ServiceFactory`] is the recipe for one service implementation: the
//! reference it satisfies, the services it needs first, and an async
//! constructor. Factories are registered defaults-first with user overrides
//! appended; the registry invokes them lazily and memoizes per scope.

use crate::instance::ServiceInstance;
use crate::refs::ServiceRef;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

/// Boxed error used as the cause type for factory, init, and hook failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Resolved instances for a factory's declared dependencies, keyed by
/// service id.
pub type ServiceDependencies = HashMap<String, ServiceInstance>;

/// Invocation context handed to a service factory.
pub struct FactoryContext {
    /// Resolved instances for every declared dependency.
    pub deps: ServiceDependencies,
    /// Plugin the instance is created for; [`crate::refs::ROOT_PLUGIN_ID`]
    /// for root-scoped factories.
    pub plugin_id: String,
}

impl FactoryContext {
    /// Look up a resolved dependency by service id.
    #[must_use]
    pub fn dep(&self, service_id: &str) -> Option<&ServiceInstance> {
        self.deps.get(service_id)
    }
}

type FactoryFn =
    Box<dyn Fn(FactoryContext) -> BoxFuture<'static, Result<ServiceInstance, BoxError>> + Send + Sync>;

/// Recipe for producing one service implementation.
pub struct ServiceFactory {
    service: ServiceRef,
    deps: Vec<ServiceRef>,
    factory: FactoryFn,
}

impl ServiceFactory {
    /// Create a factory for `service` that depends on `deps`.
    pub fn new<F, Fut>(service: ServiceRef, deps: Vec<ServiceRef>, factory: F) -> Self
    where
        F: Fn(FactoryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ServiceInstance, BoxError>> + Send + 'static,
    {
        Self {
            service,
            deps,
            factory: Box::new(move |ctx| Box::pin(factory(ctx))),
        }
    }

    /// The reference this factory satisfies.
    #[must_use]
    pub fn service(&self) -> &ServiceRef {
        &self.service
    }

    /// Services that must be resolved before this factory runs.
    #[must_use]
    pub fn dependencies(&self) -> &[ServiceRef] {
        &self.deps
    }

    /// Invoke the factory. The caller is responsible for resolving every
    /// declared dependency into `ctx.deps` first.
    pub fn instantiate(
        &self,
        ctx: FactoryContext,
    ) -> BoxFuture<'static, Result<ServiceInstance, BoxError>> {
        (self.factory)(ctx)
    }
}

impl fmt::Debug for ServiceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceFactory")
            .field("service", &self.service)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_invocation() {
        let factory = ServiceFactory::new(ServiceRef::root("answer"), Vec::new(), |ctx| async move {
            assert_eq!(ctx.plugin_id, "root");
            Ok(ServiceInstance::new(42_u64))
        });

        let instance = factory
            .instantiate(FactoryContext {
                deps: ServiceDependencies::new(),
                plugin_id: "root".to_string(),
            })
            .await
            .map_err(|e| e.to_string())
            .unwrap();

        assert_eq!(instance.downcast::<u64>().as_deref(), Some(&42));
    }

    #[test]
    fn test_factory_debug_omits_closure() {
        let factory = ServiceFactory::new(
            ServiceRef::plugin_scoped("cache"),
            vec![ServiceRef::root("db")],
            |_| async { Ok(ServiceInstance::new(())) },
        );

        let rendered = format!("{factory:?}");
        assert!(rendered.contains("cache"));
        assert!(rendered.contains("db"));
    }
}
