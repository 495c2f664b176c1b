//! End-to-end startup and shutdown scenarios, driven through the public
//! `BackendRuntime` surface with the bundled default services.
