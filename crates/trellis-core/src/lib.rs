//! # trellis-core
//!
//! Core library for the Trellis bundle system providing:
//! - Type definitions for bundles, extension items, and lifecycle state
//! - The shared error taxonomy
//! - Configuration file parsing (trellis.yaml)

pub mod config;
pub mod error;
pub mod types;

pub use config::TrellisConfig;
pub use error::{Error, Result};
