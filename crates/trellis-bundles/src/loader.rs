//! Bundle loading — assembles the runtime [`Host`] from discovered
//! bundles and compiled-in hooks
//!
//! Load runs single-threaded at process start:
//!
//! 1. discover manifests under the bundles root
//! 2. validate dependencies, computing the load order
//! 3. invoke each bundle's [`BundleHooks`] once per contribution module,
//!    module by module across all bundles in load order
//! 4. seed lifecycle defaults for the survivors
//!
//! A hook that errors or panics evicts its whole bundle: everything it
//! already registered is unregistered and the failure becomes a
//! diagnostic. The rest of the load continues.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use trellis_core::config::TrellisConfig;
use trellis_core::error::Result;
use trellis_core::types::{
    BundleDescriptor, CallerContext, ContribModule, ExtensionItem, MenuTarget, PermissionGrant,
    SettingsField, ZoneWidget, MODULE_LOAD_ORDER,
};

use crate::capability::CapabilityCheck;
use crate::dependency::DependencyResolver;
use crate::discovery::{discover_bundles, Diagnostic, DiagnosticLevel};
use crate::lifecycle::LifecycleStore;
use crate::registry::ExtensionRegistry;
use crate::resolve::{ResolutionEngine, ResolvedItem};
use crate::routes::{RouteEntry, RouteOverlay};

/// Compiled-in contribution entry points for one bundle
///
/// Each method corresponds to a contribution module; the loader only
/// calls the ones the bundle's manifest declares. Defaults are no-ops so
/// a bundle implements just the modules it has.
pub trait BundleHooks: Send + Sync {
    /// The bundle id these hooks belong to
    fn bundle_id(&self) -> &str;

    fn settings(&self, registry: &mut ExtensionRegistry<SettingsField>) -> Result<()> {
        let _ = registry;
        Ok(())
    }

    fn permissions(&self, registry: &mut ExtensionRegistry<PermissionGrant>) -> Result<()> {
        let _ = registry;
        Ok(())
    }

    fn menus(&self, registry: &mut ExtensionRegistry<MenuTarget>) -> Result<()> {
        let _ = registry;
        Ok(())
    }

    fn zones(&self, registry: &mut ExtensionRegistry<ZoneWidget>) -> Result<()> {
        let _ = registry;
        Ok(())
    }

    fn routes(&self, overlay: &mut RouteOverlay) -> Result<()> {
        let _ = overlay;
        Ok(())
    }
}

/// The assembled runtime state: registries, overlay, lifecycle, and
/// load diagnostics
pub struct Host {
    /// Loaded descriptors, dependencies before dependents
    pub descriptors: Vec<BundleDescriptor>,

    pub settings: ExtensionRegistry<SettingsField>,
    pub permissions: ExtensionRegistry<PermissionGrant>,
    pub menus: ExtensionRegistry<MenuTarget>,
    pub zones: ExtensionRegistry<ZoneWidget>,
    pub routes: RouteOverlay,

    pub lifecycle: LifecycleStore,

    /// Everything that went wrong during discovery and loading
    pub diagnostics: Vec<Diagnostic>,

    engine: ResolutionEngine,
}

impl Host {
    /// The resolution engine bound to this host's dependency graph
    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    /// Descriptor of a loaded bundle
    pub fn descriptor(&self, bundle_id: &str) -> Option<&BundleDescriptor> {
        self.descriptors.iter().find(|d| d.id() == bundle_id)
    }

    /// Whether a bundle's contributions are currently visible (the
    /// bundle and its transitive dependencies are all enabled)
    pub fn is_visible(&self, bundle_id: &str) -> bool {
        self.engine
            .owner_visible(bundle_id, &|id| self.lifecycle.is_enabled(id))
    }

    /// Every capability name registered by loaded bundles
    pub fn declared_capabilities(&self) -> BTreeSet<String> {
        self.permissions
            .all(None)
            .iter()
            .map(|item| item.alias.clone())
            .collect()
    }

    pub async fn resolve_menus(
        &self,
        section: Option<&str>,
        ctx: &CallerContext,
    ) -> Vec<ResolvedItem<MenuTarget>> {
        self.engine
            .resolve(&self.menus, section, ctx, &|id| self.lifecycle.is_enabled(id))
            .await
    }

    pub async fn resolve_settings(
        &self,
        section: Option<&str>,
        ctx: &CallerContext,
    ) -> Vec<ResolvedItem<SettingsField>> {
        self.engine
            .resolve(&self.settings, section, ctx, &|id| self.lifecycle.is_enabled(id))
            .await
    }

    /// Widgets for one content zone, in display order
    pub async fn resolve_zone(
        &self,
        zone: &str,
        ctx: &CallerContext,
    ) -> Vec<ResolvedItem<ZoneWidget>> {
        self.engine
            .resolve(&self.zones, Some(zone), ctx, &|id| self.lifecycle.is_enabled(id))
            .await
    }

    /// Effective routes under a prefix, with disabled bundles' entries
    /// dropped (un-shadowing anything they overrode)
    pub fn resolve_routes(&self, prefix: &str) -> Vec<RouteEntry> {
        self.routes
            .resolve_filtered(prefix, |owner| self.is_visible(owner))
    }
}

/// Builds a [`Host`] from a bundles directory and registered hooks
pub struct BundleLoader {
    bundles_dir: PathBuf,
    ledger_path: PathBuf,
    admin_capability: String,
    check_timeout: Duration,
    checker: Arc<dyn CapabilityCheck>,
    hooks: HashMap<String, Box<dyn BundleHooks>>,
}

impl BundleLoader {
    pub fn new(config: &TrellisConfig, checker: Arc<dyn CapabilityCheck>) -> Self {
        Self {
            bundles_dir: config.bundles_dir.clone(),
            ledger_path: config.ledger_path(),
            admin_capability: config.admin_capability.clone(),
            check_timeout: Duration::from_millis(config.capability_timeout_ms),
            checker,
            hooks: HashMap::new(),
        }
    }

    /// Register a bundle's compiled-in hooks, keyed by its bundle id
    pub fn register_hooks(&mut self, hooks: Box<dyn BundleHooks>) {
        self.hooks.insert(hooks.bundle_id().to_string(), hooks);
    }

    /// Run the load phase
    pub fn load(self) -> Host {
        let report = discover_bundles(&self.bundles_dir);
        let mut diagnostics = report.diagnostics;

        let descriptors: Vec<BundleDescriptor> = report
            .bundles
            .into_iter()
            .map(|b| b.descriptor)
            .collect();

        let resolver = DependencyResolver::new(&descriptors);
        let outcome = resolver.validate();
        for (bundle_id, error) in &outcome.errors {
            diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Error,
                bundle_id: Some(bundle_id.clone()),
                source: None,
                message: error.to_string(),
            });
        }

        let by_id: HashMap<&str, &BundleDescriptor> =
            descriptors.iter().map(|d| (d.id(), d)).collect();
        let mut loaded: HashSet<String> = outcome.ordered.iter().cloned().collect();

        let mut settings = ExtensionRegistry::new();
        let mut permissions = ExtensionRegistry::new();
        let mut menus = ExtensionRegistry::new();
        let mut zones = ExtensionRegistry::new();
        let mut overlay = RouteOverlay::new();

        for module in MODULE_LOAD_ORDER {
            for bundle_id in &outcome.ordered {
                if !loaded.contains(bundle_id) {
                    continue;
                }
                let descriptor = by_id[bundle_id.as_str()];

                // Manifest-declared grants register before the bundle's
                // own permissions hook, so manifest-only bundles show up
                if module == ContribModule::Permissions {
                    Self::seed_declared_permissions(descriptor, &mut permissions, &mut diagnostics);
                }

                if !descriptor.has_module(module) {
                    continue;
                }
                let Some(hooks) = self.hooks.get(bundle_id.as_str()) else {
                    diagnostics.push(Diagnostic {
                        level: DiagnosticLevel::Warn,
                        bundle_id: Some(bundle_id.clone()),
                        source: None,
                        message: format!(
                            "declares module '{}' but no hooks are registered",
                            module
                        ),
                    });
                    continue;
                };

                debug!("Loading module '{}' of bundle '{}'", module, bundle_id);
                let hook_result = catch_unwind(AssertUnwindSafe(|| match module {
                    ContribModule::Settings => hooks.settings(&mut settings),
                    ContribModule::Permissions => hooks.permissions(&mut permissions),
                    ContribModule::Menus => hooks.menus(&mut menus),
                    ContribModule::Zones => hooks.zones(&mut zones),
                    ContribModule::Routes => hooks.routes(&mut overlay),
                }));
                let failure = match hook_result {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(format!("module '{}' failed: {}", module, e)),
                    Err(_) => Some(format!("module '{}' panicked", module)),
                };
                if let Some(message) = failure {
                    warn!("Evicting bundle '{}': {}", bundle_id, message);
                    loaded.remove(bundle_id.as_str());
                    settings.unregister_bundle(bundle_id);
                    permissions.unregister_bundle(bundle_id);
                    menus.unregister_bundle(bundle_id);
                    zones.unregister_bundle(bundle_id);
                    overlay.unregister_bundle(bundle_id);
                    diagnostics.push(Diagnostic {
                        level: DiagnosticLevel::Error,
                        bundle_id: Some(bundle_id.clone()),
                        source: None,
                        message,
                    });
                }
            }

            // Batch boundary per module phase; forward parent references
            // across bundles within the phase are fine, anything still
            // dangling is evicted here
            let batch_errors = match module {
                ContribModule::Settings => settings.finish_batch(),
                ContribModule::Permissions => permissions.finish_batch(),
                ContribModule::Menus => menus.finish_batch(),
                ContribModule::Zones => zones.finish_batch(),
                ContribModule::Routes => Vec::new(),
            };
            for error in batch_errors {
                diagnostics.push(Diagnostic {
                    level: DiagnosticLevel::Warn,
                    bundle_id: None,
                    source: None,
                    message: error.to_string(),
                });
            }
        }

        let mut lifecycle = LifecycleStore::new(
            self.ledger_path,
            Arc::clone(&self.checker),
            self.admin_capability,
            self.check_timeout,
        );
        let mut final_descriptors = Vec::new();
        for bundle_id in &outcome.ordered {
            if loaded.contains(bundle_id) {
                let descriptor = (*by_id[bundle_id.as_str()]).clone();
                lifecycle.seed_default(descriptor.id(), descriptor.enabled);
                final_descriptors.push(descriptor);
            }
        }
        info!(
            "Loaded {} bundle(s), {} diagnostic(s)",
            final_descriptors.len(),
            diagnostics.len()
        );

        let engine = ResolutionEngine::new(
            resolver.into_graph(),
            self.checker,
            self.check_timeout,
        );

        Host {
            descriptors: final_descriptors,
            settings,
            permissions,
            menus,
            zones,
            routes: overlay,
            lifecycle,
            diagnostics,
            engine,
        }
    }

    fn seed_declared_permissions(
        descriptor: &BundleDescriptor,
        registry: &mut ExtensionRegistry<PermissionGrant>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for permission in &descriptor.permissions {
            let item = ExtensionItem::new(
                &permission.name,
                descriptor.id(),
                "permissions",
                PermissionGrant {
                    description: permission.description.clone(),
                },
            );
            if let Err(e) = registry.register(item, false) {
                diagnostics.push(Diagnostic {
                    level: DiagnosticLevel::Error,
                    bundle_id: Some(descriptor.id().to_string()),
                    source: None,
                    message: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;

    struct AllowAll;

    #[async_trait]
    impl CapabilityCheck for AllowAll {
        async fn check(&self, _ctx: &CallerContext, _capability: &str) -> AnyResult<bool> {
            Ok(true)
        }
    }

    fn write_manifest(root: &Path, name: &str, body: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bundle.yaml"), body).unwrap();
    }

    fn config(root: &Path) -> TrellisConfig {
        TrellisConfig {
            bundles_dir: root.join("bundles"),
            state_dir: root.join("state"),
            admin_capability: "trellis.manage".into(),
            capability_timeout_ms: 200,
        }
    }

    struct BlogHooks;

    impl BundleHooks for BlogHooks {
        fn bundle_id(&self) -> &str {
            "blog"
        }

        fn menus(&self, registry: &mut ExtensionRegistry<MenuTarget>) -> Result<()> {
            registry.register(
                ExtensionItem::new("posts", "blog", "main", MenuTarget {
                    route: "blog:index".into(),
                    icon: None,
                }),
                false,
            )
        }

        fn routes(&self, overlay: &mut RouteOverlay) -> Result<()> {
            overlay.merge(
                "blog/",
                vec![RouteEntry::new("", "blog:index", "blog.list_view")],
                "blog",
            )
        }
    }

    struct PanickingHooks;

    impl BundleHooks for PanickingHooks {
        fn bundle_id(&self) -> &str {
            "broken"
        }

        fn menus(&self, registry: &mut ExtensionRegistry<MenuTarget>) -> Result<()> {
            registry.register(
                ExtensionItem::new("pre-panic", "broken", "main", MenuTarget {
                    route: "broken:x".into(),
                    icon: None,
                }),
                false,
            )?;
            panic!("hook exploded")
        }
    }

    #[tokio::test]
    async fn loads_bundle_with_hooks_and_manifest_permissions() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        write_manifest(
            &config.bundles_dir,
            "blog",
            "name: blog\nversion: 1.0.0\nmodules: [menus, routes]\npermissions:\n  - name: blog.publish\n    description: Publish posts\n",
        );

        let mut loader = BundleLoader::new(&config, Arc::new(AllowAll));
        loader.register_hooks(Box::new(BlogHooks));
        let host = loader.load();

        assert_eq!(host.descriptors.len(), 1);
        assert!(host.diagnostics.is_empty());
        assert!(host.declared_capabilities().contains("blog.publish"));
        assert_eq!(host.resolve_routes("blog/").len(), 1);

        let menus = host.resolve_menus(Some("main"), &CallerContext::anonymous()).await;
        assert_eq!(menus.len(), 1);
        assert_eq!(menus[0].alias, "posts");
    }

    #[tokio::test]
    async fn panicking_hook_evicts_only_its_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        write_manifest(
            &config.bundles_dir,
            "blog",
            "name: blog\nversion: 1.0.0\nmodules: [menus]\n",
        );
        write_manifest(
            &config.bundles_dir,
            "broken",
            "name: broken\nversion: 1.0.0\nmodules: [menus]\n",
        );

        let mut loader = BundleLoader::new(&config, Arc::new(AllowAll));
        loader.register_hooks(Box::new(BlogHooks));
        loader.register_hooks(Box::new(PanickingHooks));
        let host = loader.load();

        let loaded: Vec<&str> = host.descriptors.iter().map(|d| d.id()).collect();
        assert_eq!(loaded, vec!["blog"]);
        assert!(host.menus.get("pre-panic").is_none());
        assert!(host
            .diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error
                && d.bundle_id.as_deref() == Some("broken")));
    }

    #[tokio::test]
    async fn missing_dependency_surfaces_as_diagnostic() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        write_manifest(
            &config.bundles_dir,
            "shop",
            "name: shop\nversion: 1.0.0\ndependencies: [payments]\n",
        );

        let host = BundleLoader::new(&config, Arc::new(AllowAll)).load();
        assert!(host.descriptors.is_empty());
        assert_eq!(host.diagnostics.len(), 1);
        assert_eq!(host.diagnostics[0].bundle_id.as_deref(), Some("shop"));
    }

    #[tokio::test]
    async fn declared_module_without_hooks_warns_but_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        write_manifest(
            &config.bundles_dir,
            "blog",
            "name: blog\nversion: 1.0.0\nmodules: [menus]\n",
        );

        let host = BundleLoader::new(&config, Arc::new(AllowAll)).load();
        assert_eq!(host.descriptors.len(), 1);
        assert!(host
            .diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warn));
    }
}
