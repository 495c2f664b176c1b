//! # Shared Graph: Dependency Ordering for the Wiring Runtime
//!
//! A small, generic directed-graph utility. Nodes carry an opaque value
//! plus two id lists: the ids they *provide* and the ids they *consume*.
//! An edge runs from a consumer to every provider of an id it consumes.
//!
//! Two operations are offered:
//!
//! - [`DependencyGraph::detect_cycle`] returns the offending node sequence
//!   when the graph is cyclic, for diagnostic formatting.
//! - [`DependencyGraph::parallel_topological_traversal`] visits every node
//!   exactly once, running all currently-ready nodes concurrently. A node
//!   is ready once every provider of every id it consumes has completed.
//!
//! Ids consumed by nobody-provides are treated as externally satisfied:
//! the consumer does not wait for them. Multiple providers of one id are
//! all awaited. A node providing an id it also consumes does not depend on
//! itself.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

mod graph;

pub use graph::{DependencyGraph, DependencyNode};
