//! # Wiring Orchestrator
//!
//! The top-level initializer. [`BackendRuntime`] walks the phases
//! `Configuring -> Starting -> Running -> Stopping -> Stopped | Failed`:
//!
//! 1. Features are admitted while Configuring.
//! 2. `start()` freezes the service registry (defaults first, overrides
//!    appended), lets the optional discovery service contribute features,
//!    force-instantiates every root-scoped service, indexes registrations,
//!    and initializes all plugins in parallel.
//! 3. Root lifecycle startup runs last; the runtime enters Running and,
//!    outside test configurations, installs the signal task and panic
//!    logger.
//! 4. `stop()` awaits start completion (even a failed one), drives root
//!    lifecycle shutdown exactly once, and shares its outcome with every
//!    caller.

mod plugins;

use crate::catalog::{FeatureCatalog, RegistrationIndex};
use crate::host::{NullProcessHost, OsProcessHost, ProcessHost};
use crate::registry::ServiceRegistry;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use shared_types::{
    core_services, BackendFeature, FeatureDiscoveryService, LifecycleService, LoggerService,
    ServiceFactory, ServiceScope, WiringError, ROOT_PLUGIN_ID,
};
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Install the signal task and panic logger on entering Running.
    /// Disabled for tests, which must not touch process-wide state.
    pub install_process_hooks: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            install_process_hooks: true,
        }
    }
}

impl RuntimeConfig {
    /// Configuration for tests: no process-wide hooks.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            install_process_hooks: false,
        }
    }
}

/// Top-level state of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimePhase {
    Configuring,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

type StopOutcome = Result<(), String>;

struct RuntimeInner {
    config: RuntimeConfig,
    host: Arc<dyn ProcessHost>,
    phase: Mutex<RuntimePhase>,
    defaults: Mutex<Option<Vec<ServiceFactory>>>,
    catalog: Mutex<Option<FeatureCatalog>>,
    registry: Mutex<Option<Arc<ServiceRegistry>>>,
    start_done_tx: watch::Sender<bool>,
    start_done_rx: watch::Receiver<bool>,
    stop_outcome: OnceCell<StopOutcome>,
}

/// The backend initializer and orchestrator.
///
/// Cheap to clone; every clone shares the same state, which is what the
/// signal task uses to drive `stop()`.
#[derive(Clone)]
pub struct BackendRuntime {
    inner: Arc<RuntimeInner>,
}

impl BackendRuntime {
    /// A runtime with the default configuration and the real process host.
    #[must_use]
    pub fn new(default_factories: Vec<ServiceFactory>) -> Self {
        Self::with_host(RuntimeConfig::default(), Arc::new(OsProcessHost), default_factories)
    }

    /// A runtime with an explicit configuration and the real process host.
    #[must_use]
    pub fn with_config(config: RuntimeConfig, default_factories: Vec<ServiceFactory>) -> Self {
        Self::with_host(config, Arc::new(OsProcessHost), default_factories)
    }

    /// Full control over the process host. Tests combine this with
    /// [`RuntimeConfig::for_tests`] or a scripted host.
    #[must_use]
    pub fn with_host(
        config: RuntimeConfig,
        host: Arc<dyn ProcessHost>,
        default_factories: Vec<ServiceFactory>,
    ) -> Self {
        let (start_done_tx, start_done_rx) = watch::channel(false);
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                host,
                phase: Mutex::new(RuntimePhase::Configuring),
                defaults: Mutex::new(Some(default_factories)),
                catalog: Mutex::new(Some(FeatureCatalog::new())),
                registry: Mutex::new(None),
                start_done_tx,
                start_done_rx,
                stop_outcome: OnceCell::new(),
            }),
        }
    }

    /// A runtime wired for tests: no process hooks, inert host.
    #[must_use]
    pub fn for_tests(default_factories: Vec<ServiceFactory>) -> Self {
        Self::with_host(
            RuntimeConfig::for_tests(),
            Arc::new(NullProcessHost::new()),
            default_factories,
        )
    }

    /// Current phase, for observability.
    #[must_use]
    pub fn phase(&self) -> RuntimePhase {
        *self.inner.phase.lock()
    }

    /// Register a feature. Fails once `start` has been called.
    pub fn add(&self, feature: impl Into<BackendFeature>) -> Result<(), WiringError> {
        let phase = self.inner.phase.lock();
        if *phase != RuntimePhase::Configuring {
            return Err(WiringError::AlreadyStarted);
        }
        let mut catalog = self.inner.catalog.lock();
        match catalog.as_mut() {
            Some(catalog) => catalog.add(feature.into()),
            None => Err(WiringError::AlreadyStarted),
        }
    }

    /// Start the backend. Idempotent guard: a second call fails with
    /// [`WiringError::AlreadyStarted`] whatever the first call's outcome.
    pub async fn start(&self) -> Result<(), WiringError> {
        {
            let mut phase = self.inner.phase.lock();
            if *phase != RuntimePhase::Configuring {
                return Err(WiringError::AlreadyStarted);
            }
            *phase = RuntimePhase::Starting;
        }
        info!("starting backend");

        let result = self.run_startup().await;

        {
            let mut phase = self.inner.phase.lock();
            *phase = if result.is_ok() {
                RuntimePhase::Running
            } else {
                RuntimePhase::Failed
            };
        }
        let _ = self.inner.start_done_tx.send(true);

        match &result {
            Ok(()) => {
                info!("backend running");
                if self.inner.config.install_process_hooks {
                    self.install_process_hooks().await;
                }
            }
            Err(error) => warn!(error = %error, "backend startup failed"),
        }

        result
    }

    /// Stop the backend. A no-op before start; otherwise awaits start
    /// completion (ignoring its error, since cleanup still runs) and drives
    /// root lifecycle shutdown exactly once. Concurrent and repeated
    /// callers share the same outcome.
    pub async fn stop(&self) -> Result<(), WiringError> {
        {
            let phase = self.inner.phase.lock();
            if *phase == RuntimePhase::Configuring {
                debug!("stop before start is a no-op");
                return Ok(());
            }
        }

        let outcome = self
            .inner
            .stop_outcome
            .get_or_init(|| self.perform_stop())
            .await;
        outcome
            .clone()
            .map_err(|message| WiringError::ShutdownFailed { message })
    }

    async fn run_startup(&self) -> Result<(), WiringError> {
        let defaults = self.inner.defaults.lock().take().unwrap_or_default();
        let mut catalog = self.inner.catalog.lock().take().unwrap_or_default();

        // Freeze the registry: defaults first, overrides appended, last
        // write winning per service id.
        let registry = Arc::new(ServiceRegistry::new(defaults));
        registry.extend(catalog.drain_factories());
        *self.inner.registry.lock() = Some(Arc::clone(&registry));

        // The optional discovery service contributes features before
        // indexing, through the same admission rules.
        if let Some(instance) = registry
            .get(&core_services::feature_discovery(), ROOT_PLUGIN_ID)
            .await?
        {
            match instance.shared::<dyn FeatureDiscoveryService>() {
                Some(discovery) => {
                    let features = discovery
                        .backend_features()
                        .await
                        .map_err(|source| WiringError::DiscoveryFailed { source })?;
                    info!(count = features.len(), "feature discovery contributed features");
                    for feature in features {
                        catalog.add(feature)?;
                    }
                    registry.extend(catalog.drain_factories());
                }
                None => {
                    warn!("feature discovery service has an unexpected type; ignoring");
                }
            }
        }

        // Root service phase: every root-scoped service is fully
        // constructed before any plugin initialization begins.
        for service_ref in registry.service_refs() {
            if service_ref.scope() == ServiceScope::Root {
                registry.get(&service_ref, ROOT_PLUGIN_ID).await?;
                debug!(service_id = %service_ref, "root service ready");
            }
        }

        let index = RegistrationIndex::build(catalog.drain_registrations())?;
        let plugin_ids = index.all_plugin_ids();
        info!(plugins = plugin_ids.len(), "registrations indexed");

        let RegistrationIndex {
            mut plugin_inits,
            mut module_inits,
            extension_points,
        } = index;
        let extension_points = Arc::new(extension_points);

        // Plugins initialize in parallel. A failure stops nothing that is
        // already in flight; siblings run to completion and the first
        // error wins.
        let mut plugin_tasks: FuturesUnordered<_> = plugin_ids
            .into_iter()
            .map(|plugin_id| {
                let modules = module_inits.remove(&plugin_id).unwrap_or_default();
                let plugin_init = plugin_inits.remove(&plugin_id);
                plugins::initialize_plugin(
                    plugin_id,
                    modules,
                    plugin_init,
                    Arc::clone(&extension_points),
                    Arc::clone(&registry),
                )
            })
            .collect();

        let mut failure: Option<WiringError> = None;
        while let Some(result) = plugin_tasks.next().await {
            if let Err(error) = result {
                if failure.is_none() {
                    failure = Some(error);
                } else {
                    warn!(error = %error, "additional plugin startup failure");
                }
            }
        }
        if let Some(error) = failure {
            return Err(error);
        }

        // Root lifecycle startup runs after every plugin has finished.
        if let Some(instance) = registry
            .get(&core_services::root_lifecycle(), ROOT_PLUGIN_ID)
            .await?
        {
            if let Some(lifecycle) = instance.shared::<dyn LifecycleService>() {
                lifecycle.startup().await?;
            }
        }

        Ok(())
    }

    async fn install_process_hooks(&self) {
        let registry = self.inner.registry.lock().clone();
        if let Some(registry) = registry {
            if let Ok(Some(instance)) = registry
                .get(&core_services::root_logger(), ROOT_PLUGIN_ID)
                .await
            {
                if let Some(logger) = instance.shared::<dyn LoggerService>() {
                    self.inner.host.install_panic_logger(logger);
                }
            }
        }

        let runtime = self.clone();
        let host = Arc::clone(&self.inner.host);
        tokio::spawn(async move {
            host.terminate_signal().await;
            info!("termination signal received, stopping backend");
            let code = match runtime.stop().await {
                Ok(()) => 0,
                Err(_) => 1,
            };
            host.exit(code);
        });
    }

    async fn perform_stop(&self) -> StopOutcome {
        // Await the start future first, ignoring its error: cleanup runs
        // either way, and waiting keeps resource disposal deterministic.
        let mut start_done = self.inner.start_done_rx.clone();
        while !*start_done.borrow() {
            if start_done.changed().await.is_err() {
                break;
            }
        }

        *self.inner.phase.lock() = RuntimePhase::Stopping;
        info!("stopping backend");

        let registry = self.inner.registry.lock().clone();
        let result = match registry {
            Some(registry) => {
                match registry
                    .get(&core_services::root_lifecycle(), ROOT_PLUGIN_ID)
                    .await
                {
                    Ok(Some(instance)) => match instance.shared::<dyn LifecycleService>() {
                        Some(lifecycle) => {
                            lifecycle.shutdown().await.map_err(|error| error.to_string())
                        }
                        None => Ok(()),
                    },
                    Ok(None) => Ok(()),
                    Err(error) => Err(error.to_string()),
                }
            }
            None => Ok(()),
        };

        *self.inner.phase.lock() = RuntimePhase::Stopped;
        info!("backend stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::PluginRegistration;

    #[tokio::test]
    async fn test_add_after_start_fails() {
        let runtime = BackendRuntime::for_tests(Vec::new());
        runtime.start().await.unwrap();

        let error = runtime.add(PluginRegistration::new("late")).unwrap_err();
        assert!(matches!(error, WiringError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let runtime = BackendRuntime::for_tests(Vec::new());
        runtime.start().await.unwrap();

        let error = runtime.start().await.unwrap_err();
        assert!(matches!(error, WiringError::AlreadyStarted));
        assert_eq!(runtime.phase(), RuntimePhase::Running);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let runtime = BackendRuntime::for_tests(Vec::new());
        runtime.stop().await.unwrap();
        assert_eq!(runtime.phase(), RuntimePhase::Configuring);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let runtime = BackendRuntime::for_tests(Vec::new());
        runtime.start().await.unwrap();

        runtime.stop().await.unwrap();
        runtime.stop().await.unwrap();
        assert_eq!(runtime.phase(), RuntimePhase::Stopped);
    }
}
