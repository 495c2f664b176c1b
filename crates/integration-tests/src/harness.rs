//! Shared test infrastructure: a completion recorder, a canned feature
//! discovery service, and a host the tests can script signals into.

use async_trait::async_trait;
use backend_runtime::ProcessHost;
use parking_lot::Mutex;
use shared_types::{BackendFeature, BoxError, FeatureDiscoveryService, LoggerService};
use std::sync::Arc;
use tokio::sync::Notify;

/// Observed completion order, shared across init closures and hooks.
#[derive(Clone, Default)]
pub struct CompletionLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CompletionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: impl Into<String>) {
        self.entries.lock().push(name.into());
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Index at which `name` was recorded, if at all.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.lock().iter().position(|entry| entry == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

/// Feature discovery stub handing out a fixed feature set once.
pub struct StaticDiscovery {
    features: Mutex<Option<Vec<BackendFeature>>>,
}

impl StaticDiscovery {
    #[must_use]
    pub fn new(features: Vec<BackendFeature>) -> Self {
        Self {
            features: Mutex::new(Some(features)),
        }
    }
}

#[async_trait]
impl FeatureDiscoveryService for StaticDiscovery {
    async fn backend_features(&self) -> Result<Vec<BackendFeature>, BoxError> {
        Ok(self.features.lock().take().unwrap_or_default())
    }
}

/// Process host scripted from tests: the termination signal fires when the
/// test says so, and `exit` records the code instead of terminating.
#[derive(Default)]
pub struct TriggerHost {
    signal: Notify,
    exited: Notify,
    exit_code: Mutex<Option<i32>>,
}

impl TriggerHost {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver the termination signal.
    pub fn send_signal(&self) {
        self.signal.notify_one();
    }

    /// Wait until the runtime asked the host to exit, returning the code.
    pub async fn wait_exit(&self) -> i32 {
        loop {
            if let Some(code) = *self.exit_code.lock() {
                return code;
            }
            let notified = self.exited.notified();
            if let Some(code) = *self.exit_code.lock() {
                return code;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl ProcessHost for TriggerHost {
    async fn terminate_signal(&self) {
        self.signal.notified().await;
    }

    fn exit(&self, code: i32) {
        *self.exit_code.lock() = Some(code);
        self.exited.notify_waiters();
    }

    fn install_panic_logger(&self, _logger: Arc<dyn LoggerService>) {}
}
