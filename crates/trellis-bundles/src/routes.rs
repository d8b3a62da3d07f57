//! Route overlay
//!
//! Bundles contribute route entries under a host path prefix. The host
//! tries the overlay first; any sub-path absent from the overlay falls
//! through to the host's own routing, so the host's logical route names
//! keep working for everything a bundle did not touch.

use std::collections::HashMap;

use tracing::debug;
use trellis_core::error::{Error, Result};

/// One contributed route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Sub-path under the prefix ("" is the prefix root)
    pub sub_path: String,

    /// Logical route name, unique within the prefix
    pub route_name: String,

    /// Opaque handler reference the host dispatches on
    pub handler: String,
}

impl RouteEntry {
    pub fn new(
        sub_path: impl Into<String>,
        route_name: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            sub_path: sub_path.into(),
            route_name: route_name.into(),
            handler: handler.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct OverlayRecord {
    owner: String,
    entry: RouteEntry,
}

/// Merged route contributions, grouped by path prefix
#[derive(Debug, Default)]
pub struct RouteOverlay {
    prefixes: HashMap<String, Vec<OverlayRecord>>,
}

impl RouteOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bundle's entries under a prefix
    ///
    /// Re-binding an existing sub-path is allowed (last write wins at
    /// resolution), but reusing a route name for a *different* sub-path
    /// is rejected so the host's name-based lookups stay unambiguous.
    pub fn merge(
        &mut self,
        prefix: &str,
        entries: Vec<RouteEntry>,
        owner_bundle_id: &str,
    ) -> Result<()> {
        let records = self.prefixes.entry(prefix.to_string()).or_default();
        for entry in entries {
            if records.iter().any(|record| {
                record.entry.route_name == entry.route_name
                    && record.entry.sub_path != entry.sub_path
            }) {
                return Err(Error::route_name_collision(prefix, entry.route_name));
            }
            debug!(
                "Overlay {}{} -> {} (bundle '{}')",
                prefix, entry.sub_path, entry.handler, owner_bundle_id
            );
            records.push(OverlayRecord {
                owner: owner_bundle_id.to_string(),
                entry,
            });
        }
        Ok(())
    }

    /// Resolve a prefix to its effective entries
    ///
    /// Entries appear in registration order with each sub-path at most
    /// once; a later registration for an existing sub-path replaces the
    /// earlier one in place. Sub-paths not present here fall through to
    /// the host.
    pub fn resolve_routes(&self, prefix: &str) -> Vec<RouteEntry> {
        self.resolve_filtered(prefix, |_| true)
    }

    /// Resolve a prefix, skipping records whose owning bundle fails the
    /// predicate (used for lifecycle gating)
    pub fn resolve_filtered<F>(&self, prefix: &str, mut owner_visible: F) -> Vec<RouteEntry>
    where
        F: FnMut(&str) -> bool,
    {
        let mut entries: Vec<RouteEntry> = Vec::new();
        let mut index_by_sub_path: HashMap<&str, usize> = HashMap::new();

        for record in self.prefixes.get(prefix).map(|r| r.as_slice()).unwrap_or(&[]) {
            if !owner_visible(&record.owner) {
                continue;
            }
            match index_by_sub_path.get(record.entry.sub_path.as_str()) {
                Some(&i) => entries[i] = record.entry.clone(),
                None => {
                    index_by_sub_path.insert(record.entry.sub_path.as_str(), entries.len());
                    entries.push(record.entry.clone());
                }
            }
        }
        entries
    }

    /// All prefixes with at least one record
    pub fn prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = self
            .prefixes
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(prefix, _)| prefix.as_str())
            .collect();
        prefixes.sort();
        prefixes
    }

    /// Drop every record contributed by a bundle
    ///
    /// Earlier registrations shadowed by the removed bundle become
    /// reachable again.
    pub fn unregister_bundle(&mut self, bundle_id: &str) -> usize {
        let mut removed = 0;
        for records in self.prefixes.values_mut() {
            let before = records.len();
            records.retain(|record| record.owner != bundle_id);
            removed += before - records.len();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_merge_across_bundles() {
        let mut overlay = RouteOverlay::new();
        overlay
            .merge("blog/", vec![RouteEntry::new("", "blog:index", "blog.list_view")], "blog")
            .unwrap();
        overlay
            .merge(
                "blog/",
                vec![RouteEntry::new("export/", "blog:export", "advanced.export_view")],
                "advanced_blog",
            )
            .unwrap();

        let routes = overlay.resolve_routes("blog/");
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].sub_path, "");
        assert_eq!(routes[1].sub_path, "export/");
        assert_eq!(overlay.prefixes(), vec!["blog/"]);
    }

    #[test]
    fn last_write_wins_on_exact_sub_path() {
        let mut overlay = RouteOverlay::new();
        overlay
            .merge("blog/", vec![RouteEntry::new("", "blog:index", "blog.list_view")], "blog")
            .unwrap();
        overlay
            .merge(
                "blog/",
                vec![RouteEntry::new("", "blog:index", "advanced.fancy_list_view")],
                "advanced_blog",
            )
            .unwrap();

        let routes = overlay.resolve_routes("blog/");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].handler, "advanced.fancy_list_view");
    }

    #[test]
    fn route_name_collision_rejected() {
        let mut overlay = RouteOverlay::new();
        overlay
            .merge("blog/", vec![RouteEntry::new("", "blog:index", "blog.list_view")], "blog")
            .unwrap();

        let err = overlay
            .merge(
                "blog/",
                vec![RouteEntry::new("archive/", "blog:index", "blog.archive_view")],
                "blog",
            )
            .unwrap_err();
        assert!(matches!(err, Error::RouteNameCollision { .. }));
    }

    #[test]
    fn unknown_prefix_resolves_empty() {
        let overlay = RouteOverlay::new();
        assert!(overlay.resolve_routes("shop/").is_empty());
    }

    #[test]
    fn unregister_unshadows_earlier_registration() {
        let mut overlay = RouteOverlay::new();
        overlay
            .merge("blog/", vec![RouteEntry::new("", "blog:index", "blog.list_view")], "blog")
            .unwrap();
        overlay
            .merge(
                "blog/",
                vec![RouteEntry::new("", "blog:index", "advanced.fancy_list_view")],
                "advanced_blog",
            )
            .unwrap();

        overlay.unregister_bundle("advanced_blog");
        let routes = overlay.resolve_routes("blog/");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].handler, "blog.list_view");
    }

    #[test]
    fn filtered_resolution_skips_hidden_owner() {
        let mut overlay = RouteOverlay::new();
        overlay
            .merge("blog/", vec![RouteEntry::new("", "blog:index", "blog.list_view")], "blog")
            .unwrap();
        overlay
            .merge(
                "blog/",
                vec![RouteEntry::new("", "blog:index", "advanced.fancy_list_view")],
                "advanced_blog",
            )
            .unwrap();

        let routes = overlay.resolve_filtered("blog/", |owner| owner != "advanced_blog");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].handler, "blog.list_view");
    }
}
