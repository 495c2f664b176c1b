//! # Process Host
//!
//! Process-wide concerns (signal streams, process exit, the global panic
//! hook) are singletons, so they live behind a trait the tests can
//! substitute. The runtime installs nothing when configured for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::LoggerService;
use std::sync::Arc;
use std::sync::Once;
use tracing::warn;

/// Host abstraction for process-level integration.
#[async_trait]
pub trait ProcessHost: Send + Sync {
    /// Resolves when the process receives an interrupt or terminate
    /// signal.
    async fn terminate_signal(&self);

    /// Terminate the process with `code`.
    fn exit(&self, code: i32);

    /// Install a global logger for otherwise-unhandled failures (panics
    /// escaping spawned tasks). Logs and returns; never terminates.
    fn install_panic_logger(&self, logger: Arc<dyn LoggerService>);
}

/// The real host: tokio signal streams, `std::process::exit`, and a
/// chained panic hook.
pub struct OsProcessHost;

static PANIC_LOGGER: Once = Once::new();

#[async_trait]
impl ProcessHost for OsProcessHost {
    async fn terminate_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(mut interrupt), Ok(mut terminate)) => {
                    tokio::select! {
                        _ = interrupt.recv() => {}
                        _ = terminate.recv() => {}
                    }
                }
                _ => {
                    warn!("unix signal streams unavailable, falling back to ctrl-c");
                    if tokio::signal::ctrl_c().await.is_err() {
                        futures::future::pending::<()>().await;
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }

    fn exit(&self, code: i32) {
        std::process::exit(code);
    }

    fn install_panic_logger(&self, logger: Arc<dyn LoggerService>) {
        PANIC_LOGGER.call_once(move || {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                logger.error(&format!("unhandled panic: {info}"), None);
                previous(info);
            }));
        });
    }
}

/// Inert host for tests: the signal never fires, exit codes are recorded
/// instead of terminating, and no global hooks are touched.
#[derive(Default)]
pub struct NullProcessHost {
    exit_code: Mutex<Option<i32>>,
}

impl NullProcessHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last exit code handed to [`ProcessHost::exit`], if any.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }
}

#[async_trait]
impl ProcessHost for NullProcessHost {
    async fn terminate_signal(&self) {
        futures::future::pending::<()>().await;
    }

    fn exit(&self, code: i32) {
        *self.exit_code.lock() = Some(code);
    }

    fn install_panic_logger(&self, _logger: Arc<dyn LoggerService>) {}
}
