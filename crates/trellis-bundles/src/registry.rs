//! Generic extension registry
//!
//! One instance exists per extension kind (menus, settings fields,
//! permissions, zone widgets). Contributions are keyed by alias;
//! parent/child linkage and ordering metadata ride along on the items.
//!
//! Registration happens during the single-threaded load phase. Parent
//! references may point at aliases registered later in the same batch,
//! so validation is deferred to [`ExtensionRegistry::finish_batch`].
//! After load the registry is read-only apart from the rare, serialized
//! [`ExtensionRegistry::unregister_bundle`].

use std::collections::{HashMap, HashSet};

use tracing::debug;
use trellis_core::error::{Error, Result};
use trellis_core::types::ExtensionItem;

/// Alias-keyed registry for one extension kind
pub struct ExtensionRegistry<T> {
    items: HashMap<String, ExtensionItem<T>>,

    // Aliases registered since the last finish_batch call
    pending: Vec<String>,
}

impl<T> Default for ExtensionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExtensionRegistry<T> {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Register one item
    ///
    /// Fails with [`Error::DuplicateAlias`] if the alias exists, unless
    /// `allow_replace` is set (hot-reload path). Parent references are
    /// not checked here; call [`Self::finish_batch`] once the current
    /// load batch is complete.
    pub fn register(&mut self, item: ExtensionItem<T>, allow_replace: bool) -> Result<()> {
        if let Some(existing) = self.items.get(&item.alias) {
            if !allow_replace {
                return Err(Error::duplicate_alias(
                    item.alias.clone(),
                    existing.owner.clone(),
                ));
            }
            debug!("Replacing item '{}' (owner '{}')", item.alias, item.owner);
        }
        self.pending.push(item.alias.clone());
        self.items.insert(item.alias.clone(), item);
        Ok(())
    }

    /// Validate parent references for everything registered since the
    /// previous batch boundary
    ///
    /// Items with a parent alias that never materialized are evicted and
    /// reported; eviction repeats until no item points at a missing
    /// parent, so a dangling subtree disappears as a whole.
    pub fn finish_batch(&mut self) -> Vec<Error> {
        self.pending.clear();
        let mut errors = Vec::new();

        loop {
            let dangling: Vec<String> = self
                .items
                .values()
                .filter(|item| {
                    item.parent
                        .as_ref()
                        .is_some_and(|parent| !self.items.contains_key(parent))
                })
                .map(|item| item.alias.clone())
                .collect();
            if dangling.is_empty() {
                break;
            }
            for alias in dangling {
                if let Some(item) = self.items.remove(&alias) {
                    let parent = item.parent.unwrap_or_default();
                    errors.push(Error::dangling_parent(alias, parent));
                }
            }
        }

        errors.sort_by_key(|e| e.to_string());
        errors
    }

    /// Look up an item by alias
    pub fn get(&self, alias: &str) -> Option<&ExtensionItem<T>> {
        self.items.get(alias)
    }

    /// Children of an alias, sorted by (order, alias)
    pub fn children_of(&self, alias: &str) -> Vec<&ExtensionItem<T>> {
        let mut children: Vec<&ExtensionItem<T>> = self
            .items
            .values()
            .filter(|item| item.parent.as_deref() == Some(alias))
            .collect();
        children.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.alias.cmp(&b.alias)));
        children
    }

    /// All items, optionally filtered by section, sorted by
    /// (section, order, alias) for deterministic output
    pub fn all(&self, section: Option<&str>) -> Vec<&ExtensionItem<T>> {
        let mut items: Vec<&ExtensionItem<T>> = self
            .items
            .values()
            .filter(|item| section.is_none_or(|s| item.section == s))
            .collect();
        items.sort_by(|a, b| {
            a.section
                .cmp(&b.section)
                .then_with(|| a.order.cmp(&b.order))
                .then_with(|| a.alias.cmp(&b.alias))
        });
        items
    }

    /// Remove every item owned by a bundle, cascading to children of
    /// removed items regardless of who contributed them
    pub fn unregister_bundle(&mut self, bundle_id: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| item.owner != bundle_id);
        self.pending.retain(|alias| self.items.contains_key(alias));

        // Children whose parent just disappeared go with it.
        loop {
            let orphans: Vec<String> = self
                .items
                .values()
                .filter(|item| {
                    item.parent
                        .as_ref()
                        .is_some_and(|parent| !self.items.contains_key(parent))
                })
                .map(|item| item.alias.clone())
                .collect();
            if orphans.is_empty() {
                break;
            }
            for alias in orphans {
                self.items.remove(&alias);
            }
        }

        let removed = before - self.items.len();
        if removed > 0 {
            debug!("Unregistered {} item(s) for bundle '{}'", removed, bundle_id);
        }
        removed
    }

    /// Prune items whose owner is not a known bundle, returning the
    /// pruned aliases
    pub fn retain_owners(&mut self, known: &HashSet<String>) -> Vec<String> {
        let mut pruned: Vec<String> = self
            .items
            .values()
            .filter(|item| !known.contains(&item.owner))
            .map(|item| item.alias.clone())
            .collect();
        pruned.sort();
        for alias in &pruned {
            self.items.remove(alias);
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::types::MenuTarget;

    fn menu_item(alias: &str, owner: &str, section: &str) -> ExtensionItem<MenuTarget> {
        ExtensionItem::new(
            alias,
            owner,
            section,
            MenuTarget {
                route: format!("{owner}:{alias}"),
                icon: None,
            },
        )
    }

    #[test]
    fn duplicate_alias_rejected_first_intact() {
        let mut registry = ExtensionRegistry::new();
        registry.register(menu_item("posts", "blog", "content"), false).unwrap();

        let err = registry
            .register(menu_item("posts", "shop", "content"), false)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAlias { .. }));
        assert_eq!(registry.get("posts").unwrap().owner, "blog");
    }

    #[test]
    fn allow_replace_overwrites() {
        let mut registry = ExtensionRegistry::new();
        registry.register(menu_item("posts", "blog", "content"), false).unwrap();
        registry.register(menu_item("posts", "blog2", "content"), true).unwrap();
        assert_eq!(registry.get("posts").unwrap().owner, "blog2");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn forward_parent_reference_within_batch() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register(menu_item("drafts", "blog", "content").with_parent("posts"), false)
            .unwrap();
        registry.register(menu_item("posts", "blog", "content"), false).unwrap();

        let errors = registry.finish_batch();
        assert!(errors.is_empty());
        assert_eq!(registry.children_of("posts").len(), 1);
    }

    #[test]
    fn dangling_parent_evicted_with_subtree() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register(menu_item("drafts", "blog", "content").with_parent("missing"), false)
            .unwrap();
        registry
            .register(menu_item("old-drafts", "blog", "content").with_parent("drafts"), false)
            .unwrap();
        registry.register(menu_item("posts", "blog", "content"), false).unwrap();

        let errors = registry.finish_batch();
        assert_eq!(errors.len(), 2);
        assert!(registry.get("drafts").is_none());
        assert!(registry.get("old-drafts").is_none());
        assert!(registry.get("posts").is_some());
    }

    #[test]
    fn children_sorted_by_order_then_alias() {
        let mut registry = ExtensionRegistry::new();
        registry.register(menu_item("root", "blog", "content"), false).unwrap();
        registry
            .register(menu_item("zeta", "blog", "content").with_parent("root").with_order(10), false)
            .unwrap();
        registry
            .register(menu_item("alpha", "blog", "content").with_parent("root").with_order(10), false)
            .unwrap();
        registry
            .register(menu_item("first", "blog", "content").with_parent("root").with_order(1), false)
            .unwrap();
        registry.finish_batch();

        let aliases: Vec<&str> = registry
            .children_of("root")
            .iter()
            .map(|i| i.alias.as_str())
            .collect();
        assert_eq!(aliases, vec!["first", "alpha", "zeta"]);
    }

    #[test]
    fn all_filters_by_section() {
        let mut registry = ExtensionRegistry::new();
        registry.register(menu_item("posts", "blog", "content"), false).unwrap();
        registry.register(menu_item("users", "auth", "admin"), false).unwrap();

        assert_eq!(registry.all(Some("content")).len(), 1);
        assert_eq!(registry.all(None).len(), 2);
    }

    #[test]
    fn unregister_bundle_cascades_to_foreign_children() {
        let mut registry = ExtensionRegistry::new();
        registry.register(menu_item("posts", "blog", "content"), false).unwrap();
        registry
            .register(
                menu_item("analytics", "advanced_blog", "content").with_parent("posts"),
                false,
            )
            .unwrap();
        registry.finish_batch();

        let removed = registry.unregister_bundle("blog");
        assert_eq!(removed, 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn retain_owners_prunes_orphans() {
        let mut registry = ExtensionRegistry::new();
        registry.register(menu_item("posts", "blog", "content"), false).unwrap();
        registry.register(menu_item("carts", "ghost", "content"), false).unwrap();

        let known: HashSet<String> = ["blog".to_string()].into();
        let pruned = registry.retain_owners(&known);
        assert_eq!(pruned, vec!["carts"]);
        assert_eq!(registry.len(), 1);
    }
}
