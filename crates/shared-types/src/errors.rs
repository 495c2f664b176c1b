//! # Error Taxonomy
//!
//! Every way wiring a backend can fail, as one enum. Registration-time
//! variants are raised synchronously before start; startup variants travel
//! through the start future. Causes from init closures, factories, and
//! hooks are carried as boxed errors.

use crate::factory::BoxError;
use thiserror::Error;

/// Result alias for wiring operations.
pub type WiringResult<T> = std::result::Result<T, WiringError>;

/// Failures of the lifecycle finite-state machines.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `startup` or `shutdown` invoked a second time.
    #[error("{phase} hooks have already been invoked")]
    AlreadyInvoked { phase: &'static str },

    /// A startup hook failed; remaining startup hooks were not run.
    #[error("lifecycle hook `{label}` failed")]
    HookFailed {
        label: String,
        #[source]
        source: BoxError,
    },
}

/// Failures while registering features or starting the backend.
#[derive(Debug, Error)]
pub enum WiringError {
    /// `add` after start, or `start` called twice.
    #[error("backend has already been started")]
    AlreadyStarted,

    /// Feature failed shape validation.
    #[error("malformed feature: {reason}")]
    MalformedFeature { reason: String },

    /// Feature carries a version tag this runtime does not understand.
    #[error("unsupported feature api version `{version}` (supported: {supported})")]
    UnsupportedFeatureVersion {
        version: String,
        supported: &'static str,
    },

    /// Two override factories were provided for the same service id.
    #[error("duplicate service implementation for `{service_id}`")]
    DuplicateServiceImpl { service_id: String },

    /// Attempt to override a service the runtime reserves.
    #[error("service `{service_id}` cannot be overridden")]
    ForbiddenServiceOverride { service_id: String },

    /// Two registrations share an extension point id.
    #[error("extension point `{ext_id}` is registered more than once")]
    DuplicateExtensionPoint { ext_id: String },

    /// Two plugin registrations share a plugin id.
    #[error("plugin `{plugin_id}` is registered more than once")]
    DuplicatePluginRegistration { plugin_id: String },

    /// Two module registrations share a `(plugin_id, module_id)` pair.
    #[error("module `{module_id}` of plugin `{plugin_id}` is registered more than once")]
    DuplicateModuleRegistration {
        plugin_id: String,
        module_id: String,
    },

    /// A feature of one plugin consumes an extension point owned by another.
    #[error(
        "feature of plugin `{consumer}` depends on extension point `{ext_id}` owned by plugin `{owner}`"
    )]
    ExtensionPointOwnership {
        consumer: String,
        owner: String,
        ext_id: String,
    },

    /// Init dependencies referenced ids that resolve to nothing; every miss
    /// is listed.
    #[error("unresolved dependencies for {target}: {}", .missing.join(", "))]
    UnresolvedDependencies {
        target: String,
        missing: Vec<String>,
    },

    /// The module sub-graph of a plugin is cyclic.
    #[error("circular dependency among modules of plugin `{plugin_id}`: {path}")]
    CircularModuleDependency { plugin_id: String, path: String },

    /// Service factories form a cycle.
    #[error("circular dependency while instantiating service `{service_id}`: {path}")]
    ServiceCycle { service_id: String, path: String },

    /// A factory declares a dependency on a service nobody provides.
    #[error("missing dependency `{dependency_id}` required by service `{service_id}`")]
    MissingServiceDependency {
        service_id: String,
        dependency_id: String,
    },

    /// A service factory returned an error.
    #[error("service factory for `{service_id}` failed")]
    ServiceFactoryFailed {
        service_id: String,
        #[source]
        source: BoxError,
    },

    /// A module init closure returned an error.
    #[error("module `{module_id}` of plugin `{plugin_id}` failed to start")]
    ModuleStartupFailed {
        plugin_id: String,
        module_id: String,
        #[source]
        source: BoxError,
    },

    /// A plugin init closure returned an error.
    #[error("plugin `{plugin_id}` failed to start")]
    PluginStartupFailed {
        plugin_id: String,
        #[source]
        source: BoxError,
    },

    /// The feature discovery service failed.
    #[error("feature discovery failed")]
    DiscoveryFailed {
        #[source]
        source: BoxError,
    },

    /// Shutdown could not run to completion.
    #[error("shutdown failed: {message}")]
    ShutdownFailed { message: String },

    /// Lifecycle state machine violation.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
