//! Per-plugin initialization: module sub-graph, traversal, plugin init,
//! and the plugin lifecycle startup.

use crate::catalog::{ExtensionRegistration, ModuleInit, PluginInit};
use crate::registry::ServiceRegistry;
use parking_lot::Mutex;
use shared_types::{
    core_services, DependencyRef, LifecycleService, ResolvedDependencies, WiringError,
};
use shared_graph::DependencyGraph;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Initialize one plugin: run its modules in dependency order, then its
/// own init, then its lifecycle startup. Runs concurrently with other
/// plugins; there is no cross-plugin ordering.
pub(crate) async fn initialize_plugin(
    plugin_id: String,
    modules: HashMap<String, ModuleInit>,
    plugin_init: Option<PluginInit>,
    extension_points: Arc<HashMap<String, ExtensionRegistration>>,
    registry: Arc<ServiceRegistry>,
) -> Result<(), WiringError> {
    info!(plugin_id = %plugin_id, modules = modules.len(), "initializing plugin");

    // Module ordering is deliberately reversed: a module registering an
    // extension point must run after every module that consumes it, so
    // consumers declare their needs before providers apply extensions.
    // Each node therefore "provides" its consumed dependency ids and
    // "consumes" its registered extension point ids.
    let mut graph = DependencyGraph::new();
    let mut pending: HashMap<String, ModuleInit> = HashMap::new();
    for (module_id, module) in modules {
        let provides: Vec<String> = module
            .dependencies
            .values()
            .map(|dep| dep.id().to_string())
            .collect();
        let consumes: Vec<String> = module.provides.clone();
        graph.insert(module_id.clone(), provides, consumes);
        pending.insert(module_id, module);
    }

    if let Some(cycle) = graph.detect_cycle() {
        let path = cycle
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(WiringError::CircularModuleDependency { plugin_id, path });
    }

    let pending = Mutex::new(pending);
    graph
        .parallel_topological_traversal(|module_id: String| {
            let pending = &pending;
            let registry = &registry;
            let extension_points = &extension_points;
            let plugin_id = plugin_id.as_str();
            async move {
                let Some(module) = pending.lock().remove(&module_id) else {
                    return Ok(());
                };

                let target = format!("module `{module_id}` of plugin `{plugin_id}`");
                let deps = resolve_init_deps(
                    &module.dependencies,
                    plugin_id,
                    extension_points,
                    registry,
                    &target,
                )
                .await?;

                debug!(plugin_id = %plugin_id, module_id = %module_id, "starting module");
                (module.init)(deps)
                    .await
                    .map_err(|source| WiringError::ModuleStartupFailed {
                        plugin_id: plugin_id.to_string(),
                        module_id: module_id.clone(),
                        source,
                    })
            }
        })
        .await?;

    if let Some(init) = plugin_init {
        let target = format!("plugin `{plugin_id}`");
        let deps = resolve_init_deps(
            &init.dependencies,
            &plugin_id,
            &extension_points,
            &registry,
            &target,
        )
        .await?;

        debug!(plugin_id = %plugin_id, "starting plugin init");
        (init.init)(deps)
            .await
            .map_err(|source| WiringError::PluginStartupFailed {
                plugin_id: plugin_id.clone(),
                source,
            })?;
    }

    // The per-plugin lifecycle fires even when the plugin itself was never
    // registered (modules alone keep the plugin id alive).
    if let Some(instance) = registry.get(&core_services::lifecycle(), &plugin_id).await? {
        if let Some(lifecycle) = instance.shared::<dyn LifecycleService>() {
            lifecycle.startup().await?;
        }
    }

    info!(plugin_id = %plugin_id, "plugin started");
    Ok(())
}

/// Bind every named init dependency: extension points from the table
/// (enforcing ownership), everything else through the registry. Misses
/// are batched into a single error listing every unresolved id.
pub(crate) async fn resolve_init_deps(
    deps: &HashMap<String, DependencyRef>,
    plugin_id: &str,
    extension_points: &HashMap<String, ExtensionRegistration>,
    registry: &ServiceRegistry,
    target: &str,
) -> Result<ResolvedDependencies, WiringError> {
    let mut resolved = ResolvedDependencies::new();
    let mut missing = Vec::new();

    for (name, dep) in deps {
        if let Some(ext) = extension_points.get(dep.id()) {
            if ext.owner_plugin_id != plugin_id {
                return Err(WiringError::ExtensionPointOwnership {
                    consumer: plugin_id.to_string(),
                    owner: ext.owner_plugin_id.clone(),
                    ext_id: dep.id().to_string(),
                });
            }
            resolved.insert(name.clone(), ext.instance.clone());
        } else if let Some(instance) = registry.get_by_id(dep.id(), plugin_id).await? {
            resolved.insert(name.clone(), instance);
        } else {
            missing.push(dep.id().to_string());
        }
    }

    if !missing.is_empty() {
        missing.sort();
        return Err(WiringError::UnresolvedDependencies {
            target: target.to_string(),
            missing,
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ExtensionPointRef, ServiceFactory, ServiceInstance, ServiceRef};

    fn ext_table(entries: &[(&str, &str)]) -> HashMap<String, ExtensionRegistration> {
        entries
            .iter()
            .map(|(ext_id, owner)| {
                (
                    (*ext_id).to_string(),
                    ExtensionRegistration {
                        instance: ServiceInstance::new(()),
                        owner_plugin_id: (*owner).to_string(),
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_extension_point_ownership_is_enforced() {
        let registry = ServiceRegistry::new(Vec::new());
        let table = ext_table(&[("catalog.ext", "catalog")]);

        let mut deps = HashMap::new();
        deps.insert(
            "ext".to_string(),
            DependencyRef::from(ExtensionPointRef::new("catalog.ext")),
        );

        let error = resolve_init_deps(&deps, "scaffolder", &table, &registry, "plugin `scaffolder`")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            WiringError::ExtensionPointOwnership { consumer, owner, .. }
                if consumer == "scaffolder" && owner == "catalog"
        ));
    }

    #[tokio::test]
    async fn test_misses_are_batched() {
        let registry = ServiceRegistry::new(vec![ServiceFactory::new(
            ServiceRef::root("present"),
            Vec::new(),
            |_| async { Ok(ServiceInstance::new(())) },
        )]);
        let table = ext_table(&[]);

        let mut deps = HashMap::new();
        deps.insert("a".to_string(), DependencyRef::from(ServiceRef::root("gone.one")));
        deps.insert("b".to_string(), DependencyRef::from(ServiceRef::root("gone.two")));
        deps.insert("c".to_string(), DependencyRef::from(ServiceRef::root("present")));

        let error = resolve_init_deps(&deps, "p", &table, &registry, "plugin `p`")
            .await
            .unwrap_err();
        match error {
            WiringError::UnresolvedDependencies { missing, .. } => {
                assert_eq!(missing, vec!["gone.one".to_string(), "gone.two".to_string()]);
            }
            other => panic!("expected UnresolvedDependencies, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_owned_extension_point_binds() {
        let registry = ServiceRegistry::new(Vec::new());
        let mut table = ext_table(&[]);
        table.insert(
            "catalog.ext".to_string(),
            ExtensionRegistration {
                instance: ServiceInstance::new(9_u32),
                owner_plugin_id: "catalog".to_string(),
            },
        );

        let mut deps = HashMap::new();
        deps.insert(
            "ext".to_string(),
            DependencyRef::from(ExtensionPointRef::new("catalog.ext")),
        );

        let resolved = resolve_init_deps(&deps, "catalog", &table, &registry, "plugin `catalog`")
            .await
            .unwrap();
        assert_eq!(resolved.get::<u32>("ext").as_deref(), Some(&9));
    }
}
