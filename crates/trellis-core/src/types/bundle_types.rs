//! Bundle descriptor and lifecycle types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bundle descriptor parsed from bundle.yaml
///
/// Immutable once discovered; a changed manifest only takes effect on
/// the next process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDescriptor {
    /// Bundle id (lowercase, hyphens/underscores allowed, globally unique)
    pub name: String,

    /// Semantic version
    pub version: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Author name
    #[serde(default)]
    pub author: Option<String>,

    /// Author contact email
    #[serde(default)]
    pub email: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub url: Option<String>,

    /// Marketplace-style categories
    #[serde(default)]
    pub categories: Vec<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Dependencies (other bundle ids)
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Default enabled state, before any lifecycle override
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Contribution modules this bundle provides
    #[serde(default)]
    pub modules: Vec<ContribModule>,

    /// Capability grants declared directly in the manifest
    ///
    /// Seeded into the permission registry before the bundle's hooks run,
    /// so manifest-only bundles are still visible to `plugin permissions`.
    #[serde(default)]
    pub permissions: Vec<DeclaredPermission>,
}

fn default_enabled() -> bool {
    true
}

impl BundleDescriptor {
    /// The bundle's unique id
    pub fn id(&self) -> &str {
        &self.name
    }

    /// Whether this bundle declares a given contribution module
    pub fn has_module(&self, module: ContribModule) -> bool {
        self.modules.contains(&module)
    }
}

/// Contribution module kinds, in their fixed load order
///
/// Later modules may reference aliases registered by earlier ones
/// (e.g. a menu item's capability naming a permission alias).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContribModule {
    Settings,
    Permissions,
    Menus,
    Zones,
    Routes,
}

/// The order in which contribution modules are invoked during load
pub const MODULE_LOAD_ORDER: [ContribModule; 5] = [
    ContribModule::Settings,
    ContribModule::Permissions,
    ContribModule::Menus,
    ContribModule::Zones,
    ContribModule::Routes,
];

impl std::fmt::Display for ContribModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContribModule::Settings => write!(f, "settings"),
            ContribModule::Permissions => write!(f, "permissions"),
            ContribModule::Menus => write!(f, "menus"),
            ContribModule::Zones => write!(f, "zones"),
            ContribModule::Routes => write!(f, "routes"),
        }
    }
}

/// A capability grant declared in a bundle manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredPermission {
    /// Capability name (e.g. "blog.publish")
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

/// Resolved enabled/disabled state for one bundle
///
/// `changed_by`/`changed_at` come from the most recent lifecycle record;
/// a bundle that has never been toggled carries its manifest default,
/// no actor, and no timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleState {
    pub bundle_id: String,
    pub enabled: bool,
    pub changed_by: Option<String>,
    pub changed_at: Option<DateTime<Utc>>,
}
