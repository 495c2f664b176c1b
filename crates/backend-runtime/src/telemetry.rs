//! # Telemetry Bootstrap
//!
//! Subscriber installation for embedders that do not bring their own.
//! The runtime itself only emits `tracing` events and never installs a
//! subscriber implicitly.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a formatting subscriber capped at `level`.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(level: Level) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
}

/// Install a formatting subscriber honoring `RUST_LOG`, defaulting to
/// `info` when unset.
pub fn init_tracing_from_env() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
}
