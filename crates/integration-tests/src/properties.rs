//! Ordering, idempotence, and concurrency properties of the runtime,
//! exercised through the public surface.
