//! Error types for trellis-core

use thiserror::Error;

/// Result type alias using trellis-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Trellis
#[derive(Error, Debug)]
pub enum Error {
    /// Bundle manifest file not found
    #[error("Bundle manifest not found: {path}")]
    ManifestNotFound { path: String },

    /// Bundle manifest failed validation
    #[error("Invalid bundle manifest: {message}")]
    InvalidManifest { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Alias already registered in this registry
    #[error("Duplicate alias '{alias}' (owned by bundle '{owner}')")]
    DuplicateAlias { alias: String, owner: String },

    /// Parent alias never resolved within the load batch
    #[error("Item '{alias}' references unknown parent alias '{parent}'")]
    DanglingParent { alias: String, parent: String },

    /// Bundle id not known to the loader
    #[error("Unknown bundle: {bundle}")]
    UnknownBundle { bundle: String },

    /// Actor lacks the administrative capability
    #[error("Actor '{actor}' is not authorized to manage bundles")]
    Unauthorized { actor: String },

    /// Declared dependency was never discovered
    #[error("Bundle '{bundle}' depends on missing bundle '{dependency}'")]
    MissingDependency { bundle: String, dependency: String },

    /// Circular dependency
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// Route name reused for a different sub-path under the same prefix
    #[error("Route name '{route_name}' already bound under prefix '{prefix}'")]
    RouteNameCollision { prefix: String, route_name: String },
}

impl Error {
    /// Create a manifest not found error
    pub fn manifest_not_found(path: impl Into<String>) -> Self {
        Self::ManifestNotFound { path: path.into() }
    }

    /// Create an invalid manifest error
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
        }
    }

    /// Create a duplicate alias error
    pub fn duplicate_alias(alias: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::DuplicateAlias {
            alias: alias.into(),
            owner: owner.into(),
        }
    }

    /// Create a dangling parent error
    pub fn dangling_parent(alias: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::DanglingParent {
            alias: alias.into(),
            parent: parent.into(),
        }
    }

    /// Create an unknown bundle error
    pub fn unknown_bundle(bundle: impl Into<String>) -> Self {
        Self::UnknownBundle {
            bundle: bundle.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(actor: impl Into<String>) -> Self {
        Self::Unauthorized {
            actor: actor.into(),
        }
    }

    /// Create a missing dependency error
    pub fn missing_dependency(bundle: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::MissingDependency {
            bundle: bundle.into(),
            dependency: dependency.into(),
        }
    }

    /// Create a circular dependency error
    pub fn circular_dependency(cycle: impl Into<String>) -> Self {
        Self::CircularDependency {
            cycle: cycle.into(),
        }
    }

    /// Create a route name collision error
    pub fn route_name_collision(prefix: impl Into<String>, route_name: impl Into<String>) -> Self {
        Self::RouteNameCollision {
            prefix: prefix.into(),
            route_name: route_name.into(),
        }
    }
}
