//! # Integration Tests Crate
//!
//! End-to-end tests driving the whole wiring runtime: feature admission,
//! discovery, root services, parallel plugin initialization, lifecycle
//! startup/shutdown, and the signal path.
//!
//! ## Structure
//!
//! ```text
//! integration-tests/
//! ├── src/
//! │   ├── lib.rs         # This file
//! │   ├── harness.rs     # Shared recorders, discovery stub, scripted host
//! │   ├── scenarios.rs   # End-to-end startup/shutdown scenarios
//! │   └── properties.rs  # Ordering, idempotence, and concurrency properties
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod harness;
pub mod properties;
pub mod scenarios;
