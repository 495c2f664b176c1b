//! # Service Instances
//!
//! Type-erased shared handles for service and extension point
//! implementations. Instances cross the registry as [`ServiceInstance`] and
//! are recovered by consumers through downcasting.
//!
//! Two storage conventions are supported:
//!
//! - [`ServiceInstance::new`] stores a concrete value; recover it with
//!   [`ServiceInstance::downcast`].
//! - [`ServiceInstance::from_shared`] stores an existing `Arc<T>` (including
//!   `Arc<dyn Trait>`); recover it with [`ServiceInstance::shared`]. Core
//!   contracts such as `LifecycleService` must use this convention so the
//!   runtime can recover the trait object.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared, type-erased handle to a service or extension point implementation.
#[derive(Clone)]
pub struct ServiceInstance(Arc<dyn Any + Send + Sync>);

impl ServiceInstance {
    /// Wrap a concrete value.
    #[must_use]
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wrap an already-shared handle, preserving its identity.
    ///
    /// This is the required convention for trait-object services: register
    /// `Arc<dyn Trait>` here and recover it with [`ServiceInstance::shared`].
    #[must_use]
    pub fn from_shared<T>(value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self(Arc::new(value))
    }

    /// Recover a concrete value stored with [`ServiceInstance::new`].
    #[must_use]
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }

    /// Recover a shared handle stored with [`ServiceInstance::from_shared`].
    #[must_use]
    pub fn shared<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.0.downcast_ref::<Arc<T>>().cloned()
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceInstance")
    }
}
