//! Read-time resolution
//!
//! Resolution answers "what does this caller see right now": it walks a
//! registry, applies the bundle disable cascade, evaluates capability
//! requirements against the [`CapabilityCheck`] collaborator, and runs
//! per-item condition predicates. Every gate fails closed: an unknown
//! owner, a failed or timed-out capability check, and a panicking
//! predicate all hide the item rather than surface it.
//!
//! The cascade rule: an item is visible only while its owning bundle
//! *and every transitive dependency of that bundle* are enabled. A
//! runtime disable therefore takes effect on the next resolution, no
//! restart involved.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use trellis_core::types::{CallerContext, ExtensionItem};

use crate::capability::CapabilityCheck;
use crate::dependency::DependencyGraph;
use crate::registry::ExtensionRegistry;

/// An item that survived every visibility gate
///
/// Children are pre-filtered and sorted; a hidden parent hides its
/// subtree even when the children would pass their own gates.
#[derive(Debug, Clone)]
pub struct ResolvedItem<T> {
    pub alias: String,
    pub owner: String,
    pub section: String,
    pub order: i32,
    pub payload: T,
    pub children: Vec<ResolvedItem<T>>,
}

/// Applies lifecycle, capability, and condition gates to registries
pub struct ResolutionEngine {
    graph: DependencyGraph,
    checker: Arc<dyn CapabilityCheck>,
    check_timeout: Duration,
}

impl ResolutionEngine {
    pub fn new(
        graph: DependencyGraph,
        checker: Arc<dyn CapabilityCheck>,
        check_timeout: Duration,
    ) -> Self {
        Self {
            graph,
            checker,
            check_timeout,
        }
    }

    /// Whether a bundle's contributions are currently visible:
    /// the bundle and all its transitive dependencies are enabled
    pub fn owner_visible(&self, bundle_id: &str, enabled: &dyn Fn(&str) -> bool) -> bool {
        if !enabled(bundle_id) {
            return false;
        }
        self.graph
            .transitive_dependencies(bundle_id)
            .iter()
            .all(|dep| enabled(dep))
    }

    /// Resolve a registry for one caller
    ///
    /// Returns the visible top-level items of `section` (all sections if
    /// `None`) with their visible children attached, sorted by
    /// (section, order, alias) at each level. Capability checks are
    /// memoized for the duration of the call, so an expensive checker is
    /// consulted once per distinct capability.
    pub async fn resolve<T: Clone>(
        &self,
        registry: &ExtensionRegistry<T>,
        section: Option<&str>,
        ctx: &CallerContext,
        enabled: &dyn Fn(&str) -> bool,
    ) -> Vec<ResolvedItem<T>> {
        let mut capability_cache: HashMap<String, bool> = HashMap::new();
        let mut owner_cache: HashMap<String, bool> = HashMap::new();

        let mut resolved = Vec::new();
        for item in registry.all(section) {
            if item.parent.is_some() {
                continue;
            }
            if !self
                .item_visible(item, ctx, enabled, &mut capability_cache, &mut owner_cache)
                .await
            {
                continue;
            }

            let mut children = Vec::new();
            for child in registry.children_of(&item.alias) {
                if self
                    .item_visible(child, ctx, enabled, &mut capability_cache, &mut owner_cache)
                    .await
                {
                    children.push(Self::materialize(child, Vec::new()));
                }
            }
            resolved.push(Self::materialize(item, children));
        }
        resolved
    }

    async fn item_visible<T>(
        &self,
        item: &ExtensionItem<T>,
        ctx: &CallerContext,
        enabled: &dyn Fn(&str) -> bool,
        capability_cache: &mut HashMap<String, bool>,
        owner_cache: &mut HashMap<String, bool>,
    ) -> bool {
        let owner_ok = match owner_cache.get(&item.owner) {
            Some(&ok) => ok,
            None => {
                let ok = self.owner_visible(&item.owner, enabled);
                owner_cache.insert(item.owner.clone(), ok);
                ok
            }
        };
        if !owner_ok {
            return false;
        }

        if let Some(capability) = &item.capability {
            let held = match capability_cache.get(capability) {
                Some(&held) => held,
                None => {
                    let held = self.check_capability(ctx, capability).await;
                    capability_cache.insert(capability.clone(), held);
                    held
                }
            };
            if !held {
                return false;
            }
        }

        if let Some(condition) = &item.condition {
            let outcome = catch_unwind(AssertUnwindSafe(|| condition(ctx)));
            match outcome {
                Ok(visible) => {
                    if !visible {
                        return false;
                    }
                }
                Err(_) => {
                    warn!(
                        "Condition for item '{}' (bundle '{}') panicked; hiding it",
                        item.alias, item.owner
                    );
                    return false;
                }
            }
        }

        true
    }

    /// One bounded capability check; error and timeout read as "absent"
    async fn check_capability(&self, ctx: &CallerContext, capability: &str) -> bool {
        match tokio::time::timeout(self.check_timeout, self.checker.check(ctx, capability)).await {
            Ok(Ok(held)) => held,
            Ok(Err(e)) => {
                warn!("Capability check for '{}' failed: {}", capability, e);
                false
            }
            Err(_) => {
                warn!("Capability check for '{}' timed out", capability);
                false
            }
        }
    }

    fn materialize<T: Clone>(
        item: &ExtensionItem<T>,
        children: Vec<ResolvedItem<T>>,
    ) -> ResolvedItem<T> {
        ResolvedItem {
            alias: item.alias.clone(),
            owner: item.owner.clone(),
            section: item.section.clone(),
            order: item.order,
            payload: item.payload.clone(),
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use trellis_core::types::{BundleDescriptor, MenuTarget};

    struct FixedCaps(Vec<(&'static str, &'static str)>);

    #[async_trait]
    impl CapabilityCheck for FixedCaps {
        async fn check(&self, ctx: &CallerContext, capability: &str) -> AnyResult<bool> {
            Ok(self.0.iter().any(|(actor, cap)| {
                ctx.actor.as_deref() == Some(*actor) && *cap == capability
            }))
        }
    }

    struct HangingChecker;

    #[async_trait]
    impl CapabilityCheck for HangingChecker {
        async fn check(&self, _ctx: &CallerContext, _capability: &str) -> AnyResult<bool> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(true)
        }
    }

    fn descriptor(name: &str, deps: Vec<&str>) -> BundleDescriptor {
        serde_yaml_ng::from_str(&format!(
            "name: {name}\nversion: 1.0.0\ndependencies: [{}]\n",
            deps.join(", ")
        ))
        .unwrap()
    }

    fn menu_item(alias: &str, owner: &str) -> ExtensionItem<MenuTarget> {
        ExtensionItem::new(
            alias,
            owner,
            "main",
            MenuTarget {
                route: format!("{owner}:{alias}"),
                icon: None,
            },
        )
    }

    fn engine_for(descriptors: &[BundleDescriptor], checker: Arc<dyn CapabilityCheck>) -> ResolutionEngine {
        let graph = crate::dependency::DependencyResolver::new(descriptors).into_graph();
        ResolutionEngine::new(graph, checker, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn disable_cascades_to_dependents() {
        let descriptors = vec![
            descriptor("blog", vec![]),
            descriptor("advanced_blog", vec!["blog"]),
        ];
        let engine = engine_for(&descriptors, Arc::new(FixedCaps(vec![])));

        let mut registry = ExtensionRegistry::new();
        registry.register(menu_item("posts", "blog"), false).unwrap();
        registry.register(menu_item("analytics", "advanced_blog"), false).unwrap();
        registry.finish_batch();

        let ctx = CallerContext::anonymous();

        let all_on = engine.resolve(&registry, Some("main"), &ctx, &|_| true).await;
        assert_eq!(all_on.len(), 2);

        // Disabling the dependency hides the dependent's items too
        let blog_off = engine
            .resolve(&registry, Some("main"), &ctx, &|id| id != "blog")
            .await;
        assert!(blog_off.is_empty());

        // Disabling only the dependent leaves the dependency visible
        let advanced_off = engine
            .resolve(&registry, Some("main"), &ctx, &|id| id != "advanced_blog")
            .await;
        assert_eq!(advanced_off.len(), 1);
        assert_eq!(advanced_off[0].alias, "posts");
    }

    #[tokio::test]
    async fn capability_gates_per_caller() {
        let descriptors = vec![descriptor("blog", vec![])];
        let engine = engine_for(
            &descriptors,
            Arc::new(FixedCaps(vec![("alice", "blog.publish")])),
        );

        let mut registry = ExtensionRegistry::new();
        registry.register(menu_item("posts", "blog"), false).unwrap();
        registry
            .register(menu_item("drafts", "blog").with_capability("blog.publish"), false)
            .unwrap();
        registry.finish_batch();

        let alice = engine
            .resolve(&registry, Some("main"), &CallerContext::for_actor("alice"), &|_| true)
            .await;
        assert_eq!(alice.len(), 2);

        let bob = engine
            .resolve(&registry, Some("main"), &CallerContext::for_actor("bob"), &|_| true)
            .await;
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].alias, "posts");
    }

    #[tokio::test]
    async fn timed_out_check_hides_the_item() {
        let descriptors = vec![descriptor("blog", vec![])];
        let engine = engine_for(&descriptors, Arc::new(HangingChecker));

        let mut registry = ExtensionRegistry::new();
        registry
            .register(menu_item("drafts", "blog").with_capability("blog.publish"), false)
            .unwrap();
        registry.register(menu_item("posts", "blog"), false).unwrap();
        registry.finish_batch();

        let resolved = engine
            .resolve(&registry, Some("main"), &CallerContext::for_actor("alice"), &|_| true)
            .await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].alias, "posts");
    }

    #[tokio::test]
    async fn panicking_condition_fails_closed() {
        let descriptors = vec![descriptor("blog", vec![])];
        let engine = engine_for(&descriptors, Arc::new(FixedCaps(vec![])));

        let mut registry = ExtensionRegistry::new();
        registry
            .register(
                menu_item("broken", "blog").with_condition(|_| panic!("boom")),
                false,
            )
            .unwrap();
        registry.register(menu_item("posts", "blog"), false).unwrap();
        registry.finish_batch();

        let resolved = engine
            .resolve(&registry, Some("main"), &CallerContext::anonymous(), &|_| true)
            .await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].alias, "posts");
    }

    #[tokio::test]
    async fn hidden_parent_hides_visible_children() {
        let descriptors = vec![descriptor("blog", vec![])];
        let engine = engine_for(&descriptors, Arc::new(FixedCaps(vec![])));

        let mut registry = ExtensionRegistry::new();
        registry
            .register(menu_item("posts", "blog").with_condition(|ctx| ctx.actor.is_some()), false)
            .unwrap();
        registry
            .register(menu_item("drafts", "blog").with_parent("posts"), false)
            .unwrap();
        registry.finish_batch();

        let anonymous = engine
            .resolve(&registry, Some("main"), &CallerContext::anonymous(), &|_| true)
            .await;
        assert!(anonymous.is_empty());

        let alice = engine
            .resolve(&registry, Some("main"), &CallerContext::for_actor("alice"), &|_| true)
            .await;
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].children.len(), 1);
        assert_eq!(alice[0].children[0].alias, "drafts");
    }

    #[tokio::test]
    async fn deterministic_ordering() {
        let descriptors = vec![descriptor("blog", vec![])];
        let engine = engine_for(&descriptors, Arc::new(FixedCaps(vec![])));

        let mut registry = ExtensionRegistry::new();
        registry.register(menu_item("zeta", "blog").with_order(10), false).unwrap();
        registry.register(menu_item("alpha", "blog").with_order(10), false).unwrap();
        registry.register(menu_item("last", "blog").with_order(200), false).unwrap();
        registry.register(menu_item("first", "blog").with_order(1), false).unwrap();
        registry.finish_batch();

        let resolved = engine
            .resolve(&registry, Some("main"), &CallerContext::anonymous(), &|_| true)
            .await;
        let aliases: Vec<&str> = resolved.iter().map(|i| i.alias.as_str()).collect();
        assert_eq!(aliases, vec!["first", "alpha", "zeta", "last"]);
    }
}
