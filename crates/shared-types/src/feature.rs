//! # Feature Model
//!
//! A feature is any self-contained registration handed to the runtime: a
//! service factory override, a plugin, or a module augmenting a plugin.
//! Shape probing from dynamic systems becomes an explicit tagged union
//! here; the version discriminator is carried as a plain field and checked
//! at admission time.

use crate::factory::{BoxError, ServiceFactory};
use crate::instance::ServiceInstance;
use crate::refs::{DependencyRef, ExtensionPointRef};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Feature api version this runtime understands.
pub const SUPPORTED_API_VERSION: &str = "v1";

/// Outcome of a plugin or module init closure.
pub type InitResult = Result<(), BoxError>;

/// Boxed init closure; consumed exactly once during startup.
pub type InitFn = Box<dyn FnOnce(ResolvedDependencies) -> BoxFuture<'static, InitResult> + Send>;

fn noop_init() -> InitFn {
    Box::new(|_| Box::pin(async { Ok(()) }))
}

/// Dependency instances bound for an init closure, keyed by the name the
/// registration chose for each dependency.
#[derive(Debug, Default)]
pub struct ResolvedDependencies {
    entries: HashMap<String, ServiceInstance>,
}

impl ResolvedDependencies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, instance: ServiceInstance) {
        self.entries.insert(name.into(), instance);
    }

    /// Raw instance bound under `name`.
    #[must_use]
    pub fn instance(&self, name: &str) -> Option<&ServiceInstance> {
        self.entries.get(name)
    }

    /// Concrete value bound under `name` (see [`ServiceInstance::downcast`]).
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).and_then(ServiceInstance::downcast)
    }

    /// Shared handle bound under `name` (see [`ServiceInstance::shared`]).
    #[must_use]
    pub fn shared<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries.get(name).and_then(ServiceInstance::shared)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registration of a plugin: a named unit that initializes once, may expose
/// extension points, and owns a per-plugin lifecycle.
pub struct PluginRegistration {
    /// Version discriminator; must equal [`SUPPORTED_API_VERSION`].
    pub api_version: String,
    /// Unique plugin id.
    pub plugin_id: String,
    /// Extension points this plugin contributes, with their implementations.
    pub extension_points: Vec<(ExtensionPointRef, ServiceInstance)>,
    /// Named dependencies handed to the init closure.
    pub dependencies: HashMap<String, DependencyRef>,
    /// Runs after all of the plugin's modules have completed.
    pub init: InitFn,
}

impl PluginRegistration {
    #[must_use]
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            api_version: SUPPORTED_API_VERSION.to_string(),
            plugin_id: plugin_id.into(),
            extension_points: Vec::new(),
            dependencies: HashMap::new(),
            init: noop_init(),
        }
    }

    /// Contribute an extension point owned by this plugin.
    #[must_use]
    pub fn provides(mut self, ext: ExtensionPointRef, implementation: ServiceInstance) -> Self {
        self.extension_points.push((ext, implementation));
        self
    }

    /// Declare a named dependency for the init closure.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>, dep: impl Into<DependencyRef>) -> Self {
        self.dependencies.insert(name.into(), dep.into());
        self
    }

    /// Set the init closure.
    #[must_use]
    pub fn on_init<F, Fut>(mut self, func: F) -> Self
    where
        F: FnOnce(ResolvedDependencies) -> Fut + Send + 'static,
        Fut: Future<Output = InitResult> + Send + 'static,
    {
        self.init = Box::new(move |deps| Box::pin(func(deps)));
        self
    }

    /// Override the api version. Admission rejects anything other than
    /// [`SUPPORTED_API_VERSION`].
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }
}

impl fmt::Debug for PluginRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistration")
            .field("api_version", &self.api_version)
            .field("plugin_id", &self.plugin_id)
            .field(
                "extension_points",
                &self.extension_points.iter().map(|(r, _)| r.id()).collect::<Vec<_>>(),
            )
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Registration of a module: a named augmentation of a specific plugin that
/// runs before the plugin's own init.
pub struct ModuleRegistration {
    /// Version discriminator; must equal [`SUPPORTED_API_VERSION`].
    pub api_version: String,
    /// Plugin this module attaches to. The plugin does not have to be
    /// registered itself.
    pub plugin_id: String,
    /// Unique module id within the plugin.
    pub module_id: String,
    /// Extension points this module contributes on behalf of its plugin.
    pub extension_points: Vec<(ExtensionPointRef, ServiceInstance)>,
    /// Named dependencies handed to the init closure.
    pub dependencies: HashMap<String, DependencyRef>,
    /// Runs during the plugin's module traversal.
    pub init: InitFn,
}

impl ModuleRegistration {
    #[must_use]
    pub fn new(plugin_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            api_version: SUPPORTED_API_VERSION.to_string(),
            plugin_id: plugin_id.into(),
            module_id: module_id.into(),
            extension_points: Vec::new(),
            dependencies: HashMap::new(),
            init: noop_init(),
        }
    }

    /// Contribute an extension point owned by this module's plugin.
    #[must_use]
    pub fn provides(mut self, ext: ExtensionPointRef, implementation: ServiceInstance) -> Self {
        self.extension_points.push((ext, implementation));
        self
    }

    /// Declare a named dependency for the init closure.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>, dep: impl Into<DependencyRef>) -> Self {
        self.dependencies.insert(name.into(), dep.into());
        self
    }

    /// Set the init closure.
    #[must_use]
    pub fn on_init<F, Fut>(mut self, func: F) -> Self
    where
        F: FnOnce(ResolvedDependencies) -> Fut + Send + 'static,
        Fut: Future<Output = InitResult> + Send + 'static,
    {
        self.init = Box::new(move |deps| Box::pin(func(deps)));
        self
    }

    /// Override the api version. Admission rejects anything other than
    /// [`SUPPORTED_API_VERSION`].
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }
}

impl fmt::Debug for ModuleRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistration")
            .field("api_version", &self.api_version)
            .field("plugin_id", &self.plugin_id)
            .field("module_id", &self.module_id)
            .field(
                "extension_points",
                &self.extension_points.iter().map(|(r, _)| r.id()).collect::<Vec<_>>(),
            )
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Any self-contained registration accepted by the runtime.
pub enum BackendFeature {
    /// A service factory override.
    Service(ServiceFactory),
    /// A plugin registration.
    Plugin(PluginRegistration),
    /// A module registration.
    Module(ModuleRegistration),
}

impl fmt::Debug for BackendFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(factory) => write!(f, "BackendFeature::Service({})", factory.service()),
            Self::Plugin(reg) => write!(f, "BackendFeature::Plugin({})", reg.plugin_id),
            Self::Module(reg) => {
                write!(f, "BackendFeature::Module({}/{})", reg.plugin_id, reg.module_id)
            }
        }
    }
}

impl From<ServiceFactory> for BackendFeature {
    fn from(value: ServiceFactory) -> Self {
        Self::Service(value)
    }
}

impl From<PluginRegistration> for BackendFeature {
    fn from(value: PluginRegistration) -> Self {
        Self::Plugin(value)
    }
}

impl From<ModuleRegistration> for BackendFeature {
    fn from(value: ModuleRegistration) -> Self {
        Self::Module(value)
    }
}
