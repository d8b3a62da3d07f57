//! Bundle manifest parsing (bundle.yaml)
//!
//! Each bundle ships a `bundle.yaml` at its root:
//! ```yaml
//! name: blog
//! version: 1.2.0
//! description: Blog pages and feeds
//! dependencies: []
//! enabled: true
//! modules: [settings, permissions, menus, zones, routes]
//! permissions:
//!   - name: blog.publish
//!     description: Publish blog posts
//! ```

use std::path::Path;

use trellis_core::error::{Error, Result};
use trellis_core::types::BundleDescriptor;

/// Filename bundles must use for their manifest
pub const BUNDLE_MANIFEST_FILENAME: &str = "bundle.yaml";

/// Load and validate `bundle.yaml` from a bundle directory
pub fn load_manifest(bundle_dir: &Path) -> Result<BundleDescriptor> {
    let manifest_path = bundle_dir.join(BUNDLE_MANIFEST_FILENAME);
    if !manifest_path.exists() {
        return Err(Error::manifest_not_found(manifest_path.display().to_string()));
    }

    let content = std::fs::read_to_string(&manifest_path)?;
    let descriptor: BundleDescriptor = serde_yaml_ng::from_str(&content)?;
    validate_descriptor(&descriptor)?;
    Ok(descriptor)
}

/// Structural checks beyond what serde enforces
fn validate_descriptor(descriptor: &BundleDescriptor) -> Result<()> {
    let name = descriptor.name.trim();
    if name.is_empty() {
        return Err(Error::invalid_manifest("manifest requires a non-empty `name`"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(Error::invalid_manifest(format!(
            "bundle name '{name}' must be lowercase alphanumeric with '-' or '_'"
        )));
    }
    if descriptor.version.trim().is_empty() {
        return Err(Error::invalid_manifest(format!(
            "bundle '{name}' requires a non-empty `version`"
        )));
    }
    if descriptor.dependencies.iter().any(|d| d == name) {
        return Err(Error::invalid_manifest(format!(
            "bundle '{name}' cannot depend on itself"
        )));
    }
    for permission in &descriptor.permissions {
        if permission.name.trim().is_empty() {
            return Err(Error::invalid_manifest(format!(
                "bundle '{name}' declares a permission with an empty name"
            )));
        }
    }
    Ok(())
}
