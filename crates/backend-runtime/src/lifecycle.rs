//! # Lifecycle Hooks
//!
//! Ordered hook registries with fire-once semantics, and the default
//! [`LifecycleService`] implementation used for both the root and the
//! per-plugin variants. Startup hooks run sequentially in registration
//! order and the first failure aborts the rest; shutdown hooks run in
//! reverse registration order and failures are logged, not re-thrown,
//! because cleanup is best-effort.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{LifecycleError, LifecycleHook, LifecycleService, LoggerService};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookPhase {
    Idle,
    Running,
    Done,
    Failed,
}

/// Ordered hook list that fires exactly once.
pub struct HookRegistry {
    phase_name: &'static str,
    state: Mutex<HookPhase>,
    hooks: Mutex<Vec<LifecycleHook>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new(phase_name: &'static str) -> Self {
        Self {
            phase_name,
            state: Mutex::new(HookPhase::Idle),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, hook: LifecycleHook) {
        self.hooks.lock().push(hook);
    }

    fn begin(&self) -> Result<Vec<LifecycleHook>, LifecycleError> {
        let mut state = self.state.lock();
        if *state != HookPhase::Idle {
            return Err(LifecycleError::AlreadyInvoked {
                phase: self.phase_name,
            });
        }
        *state = HookPhase::Running;
        Ok(std::mem::take(&mut *self.hooks.lock()))
    }

    fn finish(&self, ok: bool) {
        *self.state.lock() = if ok { HookPhase::Done } else { HookPhase::Failed };
    }

    /// Run hooks sequentially in registration order. The first failure
    /// aborts the remaining hooks and is returned.
    pub async fn fire_ordered(&self) -> Result<(), LifecycleError> {
        let hooks = self.begin()?;
        debug!(phase = self.phase_name, hooks = hooks.len(), "firing lifecycle hooks");

        for (position, hook) in hooks.into_iter().enumerate() {
            let (label, func) = hook.into_parts();
            let label = label.unwrap_or_else(|| format!("{}#{position}", self.phase_name));
            if let Err(source) = func().await {
                self.finish(false);
                return Err(LifecycleError::HookFailed { label, source });
            }
        }

        self.finish(true);
        Ok(())
    }

    /// Run hooks sequentially in reverse registration order. Failures are
    /// reported through `logger` and do not stop the remaining hooks.
    pub async fn fire_reversed_logged(
        &self,
        logger: &dyn LoggerService,
    ) -> Result<(), LifecycleError> {
        let hooks = self.begin()?;
        let total = hooks.len();
        debug!(phase = self.phase_name, hooks = total, "firing lifecycle hooks in reverse");

        for (position, hook) in hooks.into_iter().rev().enumerate() {
            let (label, func) = hook.into_parts();
            let label =
                label.unwrap_or_else(|| format!("{}#{}", self.phase_name, total - 1 - position));
            if let Err(source) = func().await {
                let cause: &(dyn std::error::Error + 'static) = source.as_ref();
                logger.error(&format!("shutdown hook `{label}` failed"), Some(cause));
            }
        }

        self.finish(true);
        Ok(())
    }
}

/// Default [`LifecycleService`] for the root and per-plugin variants.
///
/// The per-plugin factory bridges this service's `shutdown` into the root
/// lifecycle, so plugin hooks drain during `stop()` without the
/// orchestrator tracking plugins individually.
pub struct BackendLifecycle {
    startup: HookRegistry,
    shutdown: HookRegistry,
    logger: Arc<dyn LoggerService>,
}

impl BackendLifecycle {
    #[must_use]
    pub fn new(logger: Arc<dyn LoggerService>) -> Self {
        Self {
            startup: HookRegistry::new("startup"),
            shutdown: HookRegistry::new("shutdown"),
            logger,
        }
    }
}

#[async_trait]
impl LifecycleService for BackendLifecycle {
    fn add_startup_hook(&self, hook: LifecycleHook) {
        self.startup.add(hook);
    }

    fn add_shutdown_hook(&self, hook: LifecycleHook) {
        self.shutdown.add(hook);
    }

    async fn startup(&self) -> Result<(), LifecycleError> {
        self.startup.fire_ordered().await
    }

    async fn shutdown(&self) -> Result<(), LifecycleError> {
        self.shutdown.fire_reversed_logged(self.logger.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::TracingLogger;

    fn recorder_hook(
        label: &str,
        log: &Arc<Mutex<Vec<String>>>,
        fail: bool,
    ) -> LifecycleHook {
        let log = Arc::clone(log);
        let name = label.to_string();
        LifecycleHook::labeled(label, move || async move {
            log.lock().push(name.clone());
            if fail {
                Err(format!("{name} failed").into())
            } else {
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_startup_hooks_run_in_registration_order() {
        let registry = HookRegistry::new("startup");
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.add(recorder_hook("first", &log, false));
        registry.add(recorder_hook("second", &log, false));

        registry.fire_ordered().await.unwrap();
        assert_eq!(*log.lock(), vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_startup_aborts_on_first_failure() {
        let registry = HookRegistry::new("startup");
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.add(recorder_hook("first", &log, true));
        registry.add(recorder_hook("second", &log, false));

        let error = registry.fire_ordered().await.unwrap_err();
        assert!(matches!(
            error,
            LifecycleError::HookFailed { label, .. } if label == "first"
        ));
        assert_eq!(*log.lock(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_second_invocation_is_rejected() {
        let registry = HookRegistry::new("startup");
        registry.fire_ordered().await.unwrap();

        let error = registry.fire_ordered().await.unwrap_err();
        assert!(matches!(
            error,
            LifecycleError::AlreadyInvoked { phase } if phase == "startup"
        ));
    }

    #[tokio::test]
    async fn test_shutdown_runs_reversed_and_survives_failures() {
        let lifecycle = BackendLifecycle::new(Arc::new(TracingLogger::new()));
        let log = Arc::new(Mutex::new(Vec::new()));
        lifecycle.add_shutdown_hook(recorder_hook("first", &log, false));
        lifecycle.add_shutdown_hook(recorder_hook("second", &log, true));
        lifecycle.add_shutdown_hook(recorder_hook("third", &log, false));

        lifecycle.shutdown().await.unwrap();
        assert_eq!(
            *log.lock(),
            vec!["third".to_string(), "second".to_string(), "first".to_string()]
        );
    }

    #[tokio::test]
    async fn test_lifecycle_startup_then_shutdown() {
        let lifecycle = BackendLifecycle::new(Arc::new(TracingLogger::new()));
        let log = Arc::new(Mutex::new(Vec::new()));
        lifecycle.add_startup_hook(recorder_hook("up", &log, false));
        lifecycle.add_shutdown_hook(recorder_hook("down", &log, false));

        lifecycle.startup().await.unwrap();
        lifecycle.shutdown().await.unwrap();
        assert_eq!(*log.lock(), vec!["up".to_string(), "down".to_string()]);

        assert!(lifecycle.startup().await.is_err());
        assert!(lifecycle.shutdown().await.is_err());
    }
}
