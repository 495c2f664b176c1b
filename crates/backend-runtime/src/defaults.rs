//! # Default Core Services
//!
//! Minimal factories for the services the orchestrator itself resolves:
//! root/plugin loggers, root/plugin lifecycles, and plugin metadata. An
//! embedder passes [`default_service_factories`] to the runtime and
//! overrides individual entries by adding its own factories as features
//! (except `core.pluginMetadata`, which is reserved).

use crate::lifecycle::BackendLifecycle;
use serde_json::Value;
use shared_types::{
    core_services, BoxError, LifecycleHook, LifecycleService, LoggerService, PluginMetadata,
    ServiceFactory, ServiceInstance,
};
use std::sync::Arc;

/// Logger backed by the `tracing` macros. Structured fields accumulate
/// into a context string carried by child loggers.
pub struct TracingLogger {
    context: String,
}

impl TracingLogger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            context: String::new(),
        }
    }

    fn extend_context(&self, fields: &Value) -> String {
        let mut context = self.context.clone();
        if let Value::Object(map) = fields {
            for (key, value) in map {
                if !context.is_empty() {
                    context.push(' ');
                }
                let rendered = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                context.push_str(&format!("{key}={rendered}"));
            }
        }
        context
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerService for TracingLogger {
    fn child(&self, fields: Value) -> Arc<dyn LoggerService> {
        Arc::new(Self {
            context: self.extend_context(&fields),
        })
    }

    fn error(&self, message: &str, cause: Option<&(dyn std::error::Error + 'static)>) {
        match cause {
            Some(cause) => tracing::error!(context = %self.context, cause = %cause, "{message}"),
            None => tracing::error!(context = %self.context, "{message}"),
        }
    }

    fn warn(&self, message: &str) {
        tracing::warn!(context = %self.context, "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(context = %self.context, "{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!(context = %self.context, "{message}");
    }
}

fn logger_dep(ctx_dep: Option<&ServiceInstance>, what: &str) -> Result<Arc<dyn LoggerService>, BoxError> {
    ctx_dep
        .and_then(|instance| instance.shared::<dyn LoggerService>())
        .ok_or_else(|| format!("{what} is not registered as a LoggerService").into())
}

/// Factory for `core.rootLogger`.
#[must_use]
pub fn root_logger_factory() -> ServiceFactory {
    ServiceFactory::new(core_services::root_logger(), Vec::new(), |_| async {
        let logger: Arc<dyn LoggerService> = Arc::new(TracingLogger::new());
        Ok(ServiceInstance::from_shared(logger))
    })
}

/// Factory for `core.logger`: a child of the root logger tagged with the
/// plugin id.
#[must_use]
pub fn logger_factory() -> ServiceFactory {
    ServiceFactory::new(
        core_services::logger(),
        vec![core_services::root_logger()],
        |ctx| async move {
            let root = logger_dep(ctx.dep(core_services::ROOT_LOGGER_ID), "root logger")?;
            let child = root.child(serde_json::json!({ "plugin": ctx.plugin_id }));
            Ok(ServiceInstance::from_shared(child))
        },
    )
}

/// Factory for `core.rootLifecycle`.
#[must_use]
pub fn root_lifecycle_factory() -> ServiceFactory {
    ServiceFactory::new(
        core_services::root_lifecycle(),
        vec![core_services::root_logger()],
        |ctx| async move {
            let logger = logger_dep(ctx.dep(core_services::ROOT_LOGGER_ID), "root logger")?;
            let lifecycle: Arc<dyn LifecycleService> = Arc::new(BackendLifecycle::new(logger));
            Ok(ServiceInstance::from_shared(lifecycle))
        },
    )
}

/// Factory for `core.lifecycle`. Each plugin's shutdown is registered as a
/// shutdown hook on the root lifecycle, so `stop()` drains plugin hooks in
/// reverse registration order.
#[must_use]
pub fn lifecycle_factory() -> ServiceFactory {
    ServiceFactory::new(
        core_services::lifecycle(),
        vec![core_services::logger(), core_services::root_lifecycle()],
        |ctx| async move {
            let logger = logger_dep(ctx.dep(core_services::LOGGER_ID), "plugin logger")?;
            let root = ctx
                .dep(core_services::ROOT_LIFECYCLE_ID)
                .and_then(|instance| instance.shared::<dyn LifecycleService>())
                .ok_or_else(|| -> BoxError {
                    "root lifecycle is not registered as a LifecycleService".into()
                })?;

            let lifecycle: Arc<dyn LifecycleService> = Arc::new(BackendLifecycle::new(logger));
            let bridged = Arc::clone(&lifecycle);
            root.add_shutdown_hook(LifecycleHook::labeled(
                format!("plugin-{}-shutdown", ctx.plugin_id),
                move || async move {
                    bridged
                        .shutdown()
                        .await
                        .map_err(|error| Box::new(error) as BoxError)
                },
            ));

            Ok(ServiceInstance::from_shared(lifecycle))
        },
    )
}

/// Factory for `core.pluginMetadata`. Reserved: overrides are rejected at
/// admission time.
#[must_use]
pub fn plugin_metadata_factory() -> ServiceFactory {
    ServiceFactory::new(core_services::plugin_metadata(), Vec::new(), |ctx| async move {
        Ok(ServiceInstance::new(PluginMetadata::new(ctx.plugin_id)))
    })
}

/// The default factories bundled with the runtime.
#[must_use]
pub fn default_service_factories() -> Vec<ServiceFactory> {
    vec![
        root_logger_factory(),
        logger_factory(),
        root_lifecycle_factory(),
        lifecycle_factory(),
        plugin_metadata_factory(),
    ]
}
