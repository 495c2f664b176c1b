//! # Core Service Contracts
//!
//! Traits for the collaborator services the runtime itself consumes, and
//! the well-known references it resolves them by. Implementations must be
//! registered with [`ServiceInstance::from_shared`](crate::instance::ServiceInstance::from_shared)
//! as `Arc<dyn Trait>` so the runtime can recover the trait object.

use crate::errors::LifecycleError;
use crate::factory::BoxError;
use crate::feature::BackendFeature;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Well-known service references the runtime resolves during startup.
pub mod core_services {
    use crate::refs::ServiceRef;

    /// Root-scoped structured logger.
    pub const ROOT_LOGGER_ID: &str = "core.rootLogger";
    /// Plugin-scoped logger, a child of the root logger.
    pub const LOGGER_ID: &str = "core.logger";
    /// Root-scoped lifecycle; its hooks frame the whole backend.
    pub const ROOT_LIFECYCLE_ID: &str = "core.rootLifecycle";
    /// Plugin-scoped lifecycle.
    pub const LIFECYCLE_ID: &str = "core.lifecycle";
    /// Plugin identity service. Cannot be overridden.
    pub const PLUGIN_METADATA_ID: &str = "core.pluginMetadata";
    /// Optional feature discovery, resolved in root scope at startup.
    pub const FEATURE_DISCOVERY_ID: &str = "core.featureDiscovery";

    #[must_use]
    pub fn root_logger() -> ServiceRef {
        ServiceRef::root(ROOT_LOGGER_ID)
    }

    #[must_use]
    pub fn logger() -> ServiceRef {
        ServiceRef::plugin_scoped(LOGGER_ID)
    }

    #[must_use]
    pub fn root_lifecycle() -> ServiceRef {
        ServiceRef::root(ROOT_LIFECYCLE_ID)
    }

    #[must_use]
    pub fn lifecycle() -> ServiceRef {
        ServiceRef::plugin_scoped(LIFECYCLE_ID)
    }

    #[must_use]
    pub fn plugin_metadata() -> ServiceRef {
        ServiceRef::plugin_scoped(PLUGIN_METADATA_ID)
    }

    #[must_use]
    pub fn feature_discovery() -> ServiceRef {
        ServiceRef::root(FEATURE_DISCOVERY_ID)
    }
}

/// Structured logger contract.
pub trait LoggerService: Send + Sync {
    /// Derive a child logger carrying extra structured fields. `fields`
    /// should be a JSON object; other values are ignored.
    fn child(&self, fields: serde_json::Value) -> Arc<dyn LoggerService>;

    /// Log an error with an optional cause chain.
    fn error(&self, message: &str, cause: Option<&(dyn std::error::Error + 'static)>);

    fn warn(&self, message: &str);

    fn info(&self, message: &str);

    fn debug(&self, message: &str);
}

/// Boxed lifecycle callback; consumed exactly once when its phase fires.
pub type HookFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// One startup or shutdown callback with an optional diagnostic label.
pub struct LifecycleHook {
    label: Option<String>,
    func: HookFn,
}

impl LifecycleHook {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            label: None,
            func: Box::new(move || Box::pin(func())),
        }
    }

    /// Create a hook with a label used in failure diagnostics.
    pub fn labeled<F, Fut>(label: impl Into<String>, func: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            label: Some(label.into()),
            func: Box::new(move || Box::pin(func())),
        }
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn into_parts(self) -> (Option<String>, HookFn) {
        (self.label, self.func)
    }
}

/// Lifecycle contract shared by the root and per-plugin variants.
///
/// `startup` and `shutdown` each fire exactly once; a second invocation
/// fails with [`LifecycleError::AlreadyInvoked`]. Startup hooks run in
/// registration order and the first failure aborts the rest; shutdown
/// hooks run in reverse registration order and failures are logged, not
/// re-thrown.
#[async_trait]
pub trait LifecycleService: Send + Sync {
    fn add_startup_hook(&self, hook: LifecycleHook);

    fn add_shutdown_hook(&self, hook: LifecycleHook);

    async fn startup(&self) -> Result<(), LifecycleError>;

    async fn shutdown(&self) -> Result<(), LifecycleError>;
}

/// Optional root service that contributes additional features at startup,
/// before registrations are indexed.
#[async_trait]
pub trait FeatureDiscoveryService: Send + Sync {
    async fn backend_features(&self) -> Result<Vec<BackendFeature>, BoxError>;
}

/// Identity handed to plugin-scoped code via `core.pluginMetadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub plugin_id: String,
}

impl PluginMetadata {
    #[must_use]
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
        }
    }
}
