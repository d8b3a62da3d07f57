//! Extension item types and caller context

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default sort order for extension items; lower sorts first
pub const DEFAULT_ORDER: i32 = 100;

/// Context describing the caller a resolution runs for
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// Actor id, if the caller is authenticated
    pub actor: Option<String>,

    /// Free-form attributes condition predicates may inspect
    pub attributes: HashMap<String, String>,
}

impl CallerContext {
    /// Context for an authenticated actor
    pub fn for_actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            attributes: HashMap::new(),
        }
    }

    /// Context for an anonymous caller
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Attach an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }
}

/// Visibility predicate evaluated against the caller context
///
/// Evaluated in addition to `capability`; a panicking predicate hides
/// the item (fail-closed).
pub type Condition = Arc<dyn Fn(&CallerContext) -> bool + Send + Sync>;

/// One contributed extension item
///
/// The generic shape shared by menu entries, settings fields, permission
/// grants, and zone widgets. `alias` is the unique handle within a
/// registry; `parent` links children to a top-level item's alias.
#[derive(Clone)]
pub struct ExtensionItem<T> {
    /// Unique handle within the owning registry
    pub alias: String,

    /// Owning bundle id, used for attribution and disable cascade
    pub owner: String,

    /// Parent item alias, forming a two-level tree
    pub parent: Option<String>,

    /// Sort order; ties broken by alias lexical order
    pub order: i32,

    /// Logical grouping (e.g. "main", "admin", or a zone name)
    pub section: String,

    /// Capability the caller must hold for the item to be visible
    pub capability: Option<String>,

    /// Additional visibility predicate
    pub condition: Option<Condition>,

    /// Kind-specific data
    pub payload: T,
}

impl<T> ExtensionItem<T> {
    /// Create an item with default order and no parent/capability/condition
    pub fn new(
        alias: impl Into<String>,
        owner: impl Into<String>,
        section: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            alias: alias.into(),
            owner: owner.into(),
            parent: None,
            order: DEFAULT_ORDER,
            section: section.into(),
            capability: None,
            condition: None,
            payload,
        }
    }

    /// Set the parent alias
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set the sort order
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Require a capability
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    /// Attach a visibility condition
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&CallerContext) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }
}

impl<T: fmt::Debug> fmt::Debug for ExtensionItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionItem")
            .field("alias", &self.alias)
            .field("owner", &self.owner)
            .field("parent", &self.parent)
            .field("order", &self.order)
            .field("section", &self.section)
            .field("capability", &self.capability)
            .field("condition", &self.condition.as_ref().map(|_| "<predicate>"))
            .field("payload", &self.payload)
            .finish()
    }
}

/// Menu entry payload: where the entry navigates to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuTarget {
    /// Logical route name the entry links to
    pub route: String,

    /// Optional icon identifier
    #[serde(default)]
    pub icon: Option<String>,
}

/// Settings field payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsField {
    /// Field value type
    pub field_type: SettingsFieldType,

    /// Default value, serialized as a string
    #[serde(default)]
    pub default: Option<String>,

    /// Display label
    pub label: String,
}

/// Settings field value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettingsFieldType {
    Text,
    Integer,
    Boolean,
    Choice,
}

/// Permission grant payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Human-readable description of what the capability allows
    #[serde(default)]
    pub description: String,
}

/// Content-zone widget payload
///
/// The core only selects and orders template references; rendering is
/// the host's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneWidget {
    /// Template reference handed to the host's renderer
    pub template: String,
}
