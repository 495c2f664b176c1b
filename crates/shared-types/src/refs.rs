//! # Reference Types
//!
//! Identities for services and extension points. A [`ServiceRef`] names a
//! dependency-injected capability; an [`ExtensionPointRef`] names a
//! plugin-owned contribution surface. Both are compared by id alone so that
//! independently constructed references to the same id are interchangeable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Plugin id under which root-scoped factories are invoked.
pub const ROOT_PLUGIN_ID: &str = "root";

/// Caching scope of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceScope {
    /// One instance per process.
    Root,
    /// One instance per plugin id.
    Plugin,
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Plugin => write!(f, "plugin"),
        }
    }
}

/// Reference to a dependency-injected service.
///
/// Equality and hashing use the `id` alone; the scope describes how the
/// registry caches instances produced for this reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRef {
    id: String,
    scope: ServiceScope,
}

impl ServiceRef {
    /// Create a root-scoped service reference.
    #[must_use]
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scope: ServiceScope::Root,
        }
    }

    /// Create a plugin-scoped service reference.
    #[must_use]
    pub fn plugin_scoped(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scope: ServiceScope::Plugin,
        }
    }

    /// Globally unique service id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Caching scope for instances of this service.
    #[must_use]
    pub fn scope(&self) -> ServiceScope {
        self.scope
    }
}

impl PartialEq for ServiceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceRef {}

impl Hash for ServiceRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Reference to a plugin-owned extension point.
///
/// Extension points are always plugin-scoped: a concrete reference belongs
/// to exactly one plugin, established when its owning feature registers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtensionPointRef {
    id: String,
}

impl ExtensionPointRef {
    /// Create an extension point reference.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Globally unique extension point id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ExtensionPointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Either kind of reference an init closure may name in its dependency map.
///
/// Resolution keys off [`DependencyRef::id`]: ids found in the extension
/// point table bind to extension point implementations, everything else is
/// resolved through the service registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyRef {
    /// A service resolved through the registry.
    Service(ServiceRef),
    /// An extension point bound from the registration table.
    ExtensionPoint(ExtensionPointRef),
}

impl DependencyRef {
    /// The referenced id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Service(service) => service.id(),
            Self::ExtensionPoint(ext) => ext.id(),
        }
    }
}

impl From<ServiceRef> for DependencyRef {
    fn from(value: ServiceRef) -> Self {
        Self::Service(value)
    }
}

impl From<ExtensionPointRef> for DependencyRef {
    fn from(value: ExtensionPointRef) -> Self {
        Self::ExtensionPoint(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_service_ref_identity_is_by_id() {
        let a = ServiceRef::root("core.logger");
        let b = ServiceRef::plugin_scoped("core.logger");

        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_dependency_ref_id() {
        let service: DependencyRef = ServiceRef::root("db").into();
        let ext: DependencyRef = ExtensionPointRef::new("catalog.processors").into();

        assert_eq!(service.id(), "db");
        assert_eq!(ext.id(), "catalog.processors");
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(ServiceScope::Root.to_string(), "root");
        assert_eq!(ServiceScope::Plugin.to_string(), "plugin");
    }
}
