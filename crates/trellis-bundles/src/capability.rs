//! Capability collaborators
//!
//! The core never owns a permission truth source; it calls a
//! [`CapabilityCheck`] collaborator, which may be I/O-bound (remote auth
//! service). Callers bound every check with a timeout and treat
//! failure/timeout as "capability absent".
//!
//! [`CapabilityStore`] is the file-backed implementation used by the
//! administrative CLI: a grants.yaml holding the known capability set,
//! named groups, and per-user grants.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trellis_core::types::CallerContext;

/// Capability truth-source collaborator
#[async_trait]
pub trait CapabilityCheck: Send + Sync {
    /// Whether the caller holds the named capability
    async fn check(&self, ctx: &CallerContext, capability: &str) -> Result<bool>;
}

/// Per-user grants: direct capabilities plus group memberships
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserGrants {
    #[serde(default)]
    capabilities: BTreeSet<String>,
    #[serde(default)]
    groups: BTreeSet<String>,
}

/// On-disk grants file (BTree collections keep the YAML stable)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GrantsFile {
    /// Capabilities synced from bundle permission registries
    #[serde(default)]
    known: BTreeSet<String>,

    /// Named capability groups
    #[serde(default)]
    groups: BTreeMap<String, BTreeSet<String>>,

    /// Per-user grants
    #[serde(default)]
    users: BTreeMap<String, UserGrants>,
}

/// File-backed capability store (grants.yaml)
pub struct CapabilityStore {
    grants_path: PathBuf,
    grants: GrantsFile,
}

impl CapabilityStore {
    /// Load the store, creating an empty grants file if none exists
    pub fn new(grants_path: PathBuf) -> Result<Self> {
        let grants = if grants_path.exists() {
            let content = std::fs::read_to_string(&grants_path)
                .with_context(|| format!("Failed to read {}", grants_path.display()))?;
            serde_yaml_ng::from_str(&content)
                .with_context(|| format!("Failed to parse {}", grants_path.display()))?
        } else {
            debug!("Creating new grants file at {:?}", grants_path);
            GrantsFile::default()
        };
        Ok(Self {
            grants_path,
            grants,
        })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.grants_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml_ng::to_string(&self.grants)?;
        std::fs::write(&self.grants_path, content)
            .with_context(|| format!("Failed to write {}", self.grants_path.display()))
    }

    /// Replace or extend the known-capability set
    ///
    /// Without `force`, unknown names are added and existing ones kept.
    /// With `force`, names no longer present in `capabilities` are also
    /// dropped from the known set and revoked from every user and group.
    /// Returns (added, removed).
    pub fn sync_known(
        &mut self,
        capabilities: &BTreeSet<String>,
        force: bool,
    ) -> Result<(usize, usize)> {
        let added = capabilities
            .iter()
            .filter(|c| self.grants.known.insert((*c).clone()))
            .count();

        let mut removed = 0;
        if force {
            let stale: Vec<String> = self
                .grants
                .known
                .iter()
                .filter(|c| !capabilities.contains(*c))
                .cloned()
                .collect();
            removed = stale.len();
            for capability in &stale {
                self.grants.known.remove(capability);
                for group in self.grants.groups.values_mut() {
                    group.remove(capability);
                }
                for user in self.grants.users.values_mut() {
                    user.capabilities.remove(capability);
                }
            }
        }

        self.save()?;
        info!("Synced capability store: {} added, {} removed", added, removed);
        Ok((added, removed))
    }

    /// Create or update a named group holding a capability set
    pub fn create_group(
        &mut self,
        name: impl Into<String>,
        capabilities: BTreeSet<String>,
    ) -> Result<()> {
        self.grants.groups.insert(name.into(), capabilities);
        self.save()
    }

    /// Grant a capability directly to a user
    pub fn assign(&mut self, user: &str, capability: &str) -> Result<()> {
        self.grants
            .users
            .entry(user.to_string())
            .or_default()
            .capabilities
            .insert(capability.to_string());
        self.save()
    }

    /// Revoke a directly granted capability; grants via groups are
    /// untouched
    pub fn remove(&mut self, user: &str, capability: &str) -> Result<bool> {
        let removed = self
            .grants
            .users
            .get_mut(user)
            .map(|grants| grants.capabilities.remove(capability))
            .unwrap_or(false);
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Add a user to a group
    pub fn add_to_group(&mut self, user: &str, group: &str) -> Result<()> {
        self.grants
            .users
            .entry(user.to_string())
            .or_default()
            .groups
            .insert(group.to_string());
        self.save()
    }

    /// Effective capabilities: direct grants plus group grants
    pub fn user_capabilities(&self, user: &str) -> BTreeSet<String> {
        let Some(grants) = self.grants.users.get(user) else {
            return BTreeSet::new();
        };
        let mut capabilities = grants.capabilities.clone();
        for group in &grants.groups {
            if let Some(group_caps) = self.grants.groups.get(group) {
                capabilities.extend(group_caps.iter().cloned());
            }
        }
        capabilities
    }

    /// Whether a user holds a capability
    pub fn has(&self, user: &str, capability: &str) -> bool {
        self.user_capabilities(user).contains(capability)
    }

    /// The synced known-capability set
    pub fn known(&self) -> &BTreeSet<String> {
        &self.grants.known
    }

    /// Group names with their capability sets
    pub fn groups(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.grants.groups
    }

    /// Path this store persists to
    pub fn path(&self) -> &Path {
        &self.grants_path
    }
}

#[async_trait]
impl CapabilityCheck for CapabilityStore {
    async fn check(&self, ctx: &CallerContext, capability: &str) -> Result<bool> {
        // Anonymous callers hold nothing
        Ok(ctx
            .actor
            .as_deref()
            .is_some_and(|actor| self.has(actor, capability)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CapabilityStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CapabilityStore::new(dir.path().join("grants.yaml")).unwrap();
        (dir, store)
    }

    fn caps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn assign_and_remove() {
        let (_dir, mut store) = store();
        store.assign("alice", "blog.publish").unwrap();
        assert!(store.has("alice", "blog.publish"));
        assert!(!store.has("bob", "blog.publish"));

        assert!(store.remove("alice", "blog.publish").unwrap());
        assert!(!store.has("alice", "blog.publish"));
        assert!(!store.remove("alice", "blog.publish").unwrap());
    }

    #[test]
    fn group_grants_are_effective() {
        let (_dir, mut store) = store();
        store.create_group("editors", caps(&["blog.publish", "blog.edit"])).unwrap();
        store.add_to_group("alice", "editors").unwrap();

        assert!(store.has("alice", "blog.edit"));
        let effective = store.user_capabilities("alice");
        assert_eq!(effective.len(), 2);
    }

    #[test]
    fn sync_known_force_revokes_stale() {
        let (_dir, mut store) = store();
        store.sync_known(&caps(&["blog.publish", "old.cap"]), false).unwrap();
        store.assign("alice", "old.cap").unwrap();

        let (added, removed) = store.sync_known(&caps(&["blog.publish"]), true).unwrap();
        assert_eq!(added, 0);
        assert_eq!(removed, 1);
        assert!(!store.has("alice", "old.cap"));
        assert!(store.known().contains("blog.publish"));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.yaml");
        {
            let mut store = CapabilityStore::new(path.clone()).unwrap();
            store.assign("alice", "blog.publish").unwrap();
        }
        let store = CapabilityStore::new(path).unwrap();
        assert!(store.has("alice", "blog.publish"));
    }

    #[tokio::test]
    async fn capability_check_trait_impl() {
        let (_dir, mut store) = store();
        store.assign("alice", "blog.publish").unwrap();

        let ctx = CallerContext::for_actor("alice");
        assert!(store.check(&ctx, "blog.publish").await.unwrap());
        assert!(!store.check(&CallerContext::anonymous(), "blog.publish").await.unwrap());
    }
}
