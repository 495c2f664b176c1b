//! # Feature Catalog
//!
//! Admission and indexing of features. [`FeatureCatalog::add`] classifies
//! each feature (service-factory override, plugin, or module) and
//! rejects duplicates and malformed shapes synchronously, before start.
//! [`RegistrationIndex::build`] turns the admitted registrations into the
//! maps the orchestrator consumes; the index is read-only once built.

use shared_types::{
    core_services, BackendFeature, DependencyRef, ExtensionPointRef, InitFn, ModuleRegistration,
    PluginRegistration, ServiceFactory, ServiceInstance, WiringError, SUPPORTED_API_VERSION,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A plugin or module registration admitted by the catalog.
pub enum RegistrationFeature {
    Plugin(PluginRegistration),
    Module(ModuleRegistration),
}

/// Accepts features until start and splits them into service-factory
/// overrides and plugin/module registrations.
#[derive(Default)]
pub struct FeatureCatalog {
    override_ids: HashSet<String>,
    factories: Vec<ServiceFactory>,
    registrations: Vec<RegistrationFeature>,
}

impl FeatureCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one feature.
    ///
    /// Service factories join the override list; a second factory for the
    /// same id is rejected, and `core.pluginMetadata` can never be
    /// overridden. Plugin and module registrations must carry the
    /// supported api version and non-empty ids.
    pub fn add(&mut self, feature: BackendFeature) -> Result<(), WiringError> {
        match feature {
            BackendFeature::Service(factory) => {
                let service_id = factory.service().id().to_string();
                if service_id == core_services::PLUGIN_METADATA_ID {
                    return Err(WiringError::ForbiddenServiceOverride { service_id });
                }
                if !self.override_ids.insert(service_id.clone()) {
                    return Err(WiringError::DuplicateServiceImpl { service_id });
                }
                debug!(service_id = %service_id, "service override admitted");
                self.factories.push(factory);
                Ok(())
            }
            BackendFeature::Plugin(registration) => {
                check_api_version(&registration.api_version)?;
                if registration.plugin_id.trim().is_empty() {
                    return Err(WiringError::MalformedFeature {
                        reason: "plugin registration with an empty plugin id".to_string(),
                    });
                }
                debug!(plugin_id = %registration.plugin_id, "plugin registration admitted");
                self.registrations
                    .push(RegistrationFeature::Plugin(registration));
                Ok(())
            }
            BackendFeature::Module(registration) => {
                check_api_version(&registration.api_version)?;
                if registration.plugin_id.trim().is_empty()
                    || registration.module_id.trim().is_empty()
                {
                    return Err(WiringError::MalformedFeature {
                        reason: "module registration with an empty plugin or module id"
                            .to_string(),
                    });
                }
                debug!(
                    plugin_id = %registration.plugin_id,
                    module_id = %registration.module_id,
                    "module registration admitted"
                );
                self.registrations
                    .push(RegistrationFeature::Module(registration));
                Ok(())
            }
        }
    }

    /// Take the service factories admitted so far, in admission order.
    pub fn drain_factories(&mut self) -> Vec<ServiceFactory> {
        std::mem::take(&mut self.factories)
    }

    /// Take the registrations admitted so far, in admission order.
    pub fn drain_registrations(&mut self) -> Vec<RegistrationFeature> {
        std::mem::take(&mut self.registrations)
    }
}

fn check_api_version(version: &str) -> Result<(), WiringError> {
    if version == SUPPORTED_API_VERSION {
        Ok(())
    } else {
        Err(WiringError::UnsupportedFeatureVersion {
            version: version.to_string(),
            supported: SUPPORTED_API_VERSION,
        })
    }
}

/// What a plugin init needs and runs.
pub struct PluginInit {
    pub dependencies: HashMap<String, DependencyRef>,
    pub init: InitFn,
}

/// What a module init provides, needs, and runs.
pub struct ModuleInit {
    /// Extension point ids this module registered.
    pub provides: Vec<String>,
    pub dependencies: HashMap<String, DependencyRef>,
    pub init: InitFn,
}

/// One entry in the global extension point table.
pub struct ExtensionRegistration {
    pub instance: ServiceInstance,
    pub owner_plugin_id: String,
}

/// Indexed registrations, built once at startup.
#[derive(Default)]
pub struct RegistrationIndex {
    pub plugin_inits: HashMap<String, PluginInit>,
    pub module_inits: HashMap<String, HashMap<String, ModuleInit>>,
    pub extension_points: HashMap<String, ExtensionRegistration>,
}

impl std::fmt::Debug for RegistrationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationIndex")
            .field("plugin_inits", &self.plugin_inits.keys().collect::<Vec<_>>())
            .field("module_inits", &self.module_inits.keys().collect::<Vec<_>>())
            .field(
                "extension_points",
                &self.extension_points.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl RegistrationIndex {
    /// Index the admitted registrations, rejecting duplicate plugins,
    /// duplicate `(plugin, module)` pairs, and duplicate extension point
    /// ids across all features.
    pub fn build(registrations: Vec<RegistrationFeature>) -> Result<Self, WiringError> {
        let mut index = Self::default();

        for registration in registrations {
            match registration {
                RegistrationFeature::Plugin(reg) => {
                    let PluginRegistration {
                        plugin_id,
                        extension_points,
                        dependencies,
                        init,
                        ..
                    } = reg;

                    if index.plugin_inits.contains_key(&plugin_id) {
                        return Err(WiringError::DuplicatePluginRegistration { plugin_id });
                    }
                    index.register_extension_points(&plugin_id, extension_points)?;
                    index
                        .plugin_inits
                        .insert(plugin_id, PluginInit { dependencies, init });
                }
                RegistrationFeature::Module(reg) => {
                    let ModuleRegistration {
                        plugin_id,
                        module_id,
                        extension_points,
                        dependencies,
                        init,
                        ..
                    } = reg;

                    let provides: Vec<String> = extension_points
                        .iter()
                        .map(|(ext, _)| ext.id().to_string())
                        .collect();
                    index.register_extension_points(&plugin_id, extension_points)?;

                    let modules = index.module_inits.entry(plugin_id.clone()).or_default();
                    if modules.contains_key(&module_id) {
                        return Err(WiringError::DuplicateModuleRegistration {
                            plugin_id,
                            module_id,
                        });
                    }
                    modules.insert(
                        module_id,
                        ModuleInit {
                            provides,
                            dependencies,
                            init,
                        },
                    );
                }
            }
        }

        Ok(index)
    }

    fn register_extension_points(
        &mut self,
        owner_plugin_id: &str,
        points: Vec<(ExtensionPointRef, ServiceInstance)>,
    ) -> Result<(), WiringError> {
        for (ext, instance) in points {
            let ext_id = ext.id().to_string();
            if self.extension_points.contains_key(&ext_id) {
                return Err(WiringError::DuplicateExtensionPoint { ext_id });
            }
            self.extension_points.insert(
                ext_id,
                ExtensionRegistration {
                    instance,
                    owner_plugin_id: owner_plugin_id.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Every plugin id with a plugin or module registration, sorted for
    /// deterministic scheduling and logs. Modules may exist without their
    /// plugin; such plugin ids still appear here.
    #[must_use]
    pub fn all_plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .plugin_inits
            .keys()
            .chain(self.module_inits.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ServiceRef;

    fn factory(id: &str) -> BackendFeature {
        BackendFeature::Service(ServiceFactory::new(
            ServiceRef::root(id),
            Vec::new(),
            |_| async { Ok(ServiceInstance::new(())) },
        ))
    }

    #[test]
    fn test_duplicate_override_is_rejected() {
        let mut catalog = FeatureCatalog::new();
        catalog.add(factory("foo")).unwrap();

        let error = catalog.add(factory("foo")).unwrap_err();
        assert!(matches!(
            error,
            WiringError::DuplicateServiceImpl { service_id } if service_id == "foo"
        ));
    }

    #[test]
    fn test_plugin_metadata_cannot_be_overridden() {
        let mut catalog = FeatureCatalog::new();
        let error = catalog
            .add(factory(core_services::PLUGIN_METADATA_ID))
            .unwrap_err();
        assert!(matches!(error, WiringError::ForbiddenServiceOverride { .. }));
    }

    #[test]
    fn test_unknown_api_version_is_rejected() {
        let mut catalog = FeatureCatalog::new();
        let feature = PluginRegistration::new("catalog").with_api_version("v2");

        let error = catalog.add(feature.into()).unwrap_err();
        assert!(matches!(
            error,
            WiringError::UnsupportedFeatureVersion { version, .. } if version == "v2"
        ));
    }

    #[test]
    fn test_empty_ids_are_malformed() {
        let mut catalog = FeatureCatalog::new();

        let plugin = PluginRegistration::new("  ");
        assert!(matches!(
            catalog.add(plugin.into()),
            Err(WiringError::MalformedFeature { .. })
        ));

        let module = ModuleRegistration::new("catalog", "");
        assert!(matches!(
            catalog.add(module.into()),
            Err(WiringError::MalformedFeature { .. })
        ));
    }

    #[test]
    fn test_index_rejects_duplicate_plugin() {
        let mut catalog = FeatureCatalog::new();
        catalog.add(PluginRegistration::new("catalog").into()).unwrap();
        catalog.add(PluginRegistration::new("catalog").into()).unwrap();

        let error = RegistrationIndex::build(catalog.drain_registrations()).unwrap_err();
        assert!(matches!(
            error,
            WiringError::DuplicatePluginRegistration { plugin_id } if plugin_id == "catalog"
        ));
    }

    #[test]
    fn test_index_rejects_duplicate_module() {
        let mut catalog = FeatureCatalog::new();
        catalog
            .add(ModuleRegistration::new("catalog", "ldap").into())
            .unwrap();
        catalog
            .add(ModuleRegistration::new("catalog", "ldap").into())
            .unwrap();

        let error = RegistrationIndex::build(catalog.drain_registrations()).unwrap_err();
        assert!(matches!(error, WiringError::DuplicateModuleRegistration { .. }));
    }

    #[test]
    fn test_index_rejects_duplicate_extension_point() {
        let mut catalog = FeatureCatalog::new();
        catalog
            .add(
                PluginRegistration::new("catalog")
                    .provides(ExtensionPointRef::new("ext"), ServiceInstance::new(()))
                    .into(),
            )
            .unwrap();
        catalog
            .add(
                ModuleRegistration::new("other", "m")
                    .provides(ExtensionPointRef::new("ext"), ServiceInstance::new(()))
                    .into(),
            )
            .unwrap();

        let error = RegistrationIndex::build(catalog.drain_registrations()).unwrap_err();
        assert!(matches!(
            error,
            WiringError::DuplicateExtensionPoint { ext_id } if ext_id == "ext"
        ));
    }

    #[test]
    fn test_extension_point_records_owner() {
        let mut catalog = FeatureCatalog::new();
        catalog
            .add(
                ModuleRegistration::new("catalog", "m")
                    .provides(ExtensionPointRef::new("catalog.ext"), ServiceInstance::new(1_u8))
                    .into(),
            )
            .unwrap();

        let index = RegistrationIndex::build(catalog.drain_registrations()).unwrap();
        let entry = index.extension_points.get("catalog.ext").unwrap();
        assert_eq!(entry.owner_plugin_id, "catalog");
    }

    #[test]
    fn test_all_plugin_ids_is_the_key_union() {
        let mut catalog = FeatureCatalog::new();
        catalog.add(PluginRegistration::new("a").into()).unwrap();
        catalog.add(ModuleRegistration::new("b", "m1").into()).unwrap();
        catalog.add(ModuleRegistration::new("a", "m2").into()).unwrap();

        let index = RegistrationIndex::build(catalog.drain_registrations()).unwrap();
        assert_eq!(index.all_plugin_ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
