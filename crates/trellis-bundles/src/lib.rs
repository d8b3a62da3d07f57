//! # trellis-bundles
//!
//! The Trellis engine: bundle discovery, dependency validation, typed
//! extension registries, route overlays, lifecycle state, and read-time
//! resolution.
//!
//! Load phase (single-threaded, process start):
//! discovery -> descriptor parsing -> dependency validation -> hook
//! registration -> lifecycle seeding. After load the registries and
//! overlay are read-only; the only steady-state writer is
//! [`LifecycleStore::set_enabled`].

pub mod capability;
pub mod dependency;
pub mod discovery;
pub mod lifecycle;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod resolve;
pub mod routes;

pub use capability::{CapabilityCheck, CapabilityStore};
pub use dependency::{DependencyGraph, DependencyResolver, ValidationOutcome};
pub use discovery::{discover_bundles, Diagnostic, DiagnosticLevel, DiscoveredBundle, DiscoveryReport};
pub use lifecycle::{ChangeObserver, LifecycleRecord, LifecycleStore};
pub use loader::{BundleHooks, BundleLoader, Host};
pub use manifest::{load_manifest, BUNDLE_MANIFEST_FILENAME};
pub use registry::ExtensionRegistry;
pub use resolve::{ResolutionEngine, ResolvedItem};
pub use routes::{RouteEntry, RouteOverlay};
