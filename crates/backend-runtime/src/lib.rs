//! # Backend Runtime: Feature Wiring Orchestrator
//!
//! Assembles a running backend out of independently authored features:
//! service factory overrides, plugins, and modules. The runtime resolves
//! service and extension point dependencies into a concrete graph, rejects
//! illegal configurations before start, initializes everything in the
//! correct partial order with maximum safe parallelism, and drives
//! lifecycle transitions on startup, shutdown, and process signals.
//!
//! ## Control Flow
//!
//! ```text
//! features ──→ FeatureCatalog ──→ BackendRuntime::start()
//!                                        │
//!                    ┌───────────────────┼─────────────────────┐
//!                    ▼                   ▼                     ▼
//!            ServiceRegistry      RegistrationIndex      DependencyGraph
//!           (root services,      (plugins, modules,     (per-plugin module
//!            per-scope cache)     extension points)      ordering)
//!                    │                   │                     │
//!                    └───────────────────┴──────────┬──────────┘
//!                                                   ▼
//!                                        init closures + lifecycle
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use backend_runtime::{default_service_factories, BackendRuntime};
//!
//! let runtime = BackendRuntime::new(default_service_factories());
//! runtime.add(my_plugin())?;
//! runtime.start().await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod catalog;
pub mod defaults;
pub mod host;
pub mod lifecycle;
pub mod registry;
pub mod telemetry;
pub mod wiring;

pub use catalog::{FeatureCatalog, RegistrationIndex};
pub use defaults::{default_service_factories, TracingLogger};
pub use host::{NullProcessHost, OsProcessHost, ProcessHost};
pub use lifecycle::{BackendLifecycle, HookRegistry};
pub use registry::ServiceRegistry;
pub use wiring::{BackendRuntime, RuntimeConfig, RuntimePhase};
