//! Type definitions shared across the Trellis workspace

mod bundle_types;
mod item_types;

pub use bundle_types::{
    BundleDescriptor, ContribModule, DeclaredPermission, LifecycleState, MODULE_LOAD_ORDER,
};
pub use item_types::{
    CallerContext, Condition, ExtensionItem, MenuTarget, PermissionGrant, SettingsField,
    SettingsFieldType, ZoneWidget, DEFAULT_ORDER,
};
