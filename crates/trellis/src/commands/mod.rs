//! CLI command implementations

pub mod plugin;
