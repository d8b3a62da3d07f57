//! CLI argument parsing with clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Trellis - bundle administration for the Trellis host
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to trellis.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bundle (plugin) management
    #[command(subcommand)]
    Plugin(PluginCommands),
}

#[derive(Subcommand, Debug)]
pub enum PluginCommands {
    /// Show discovered bundle metadata
    Info(PluginInfoArgs),

    /// Show each bundle's resolved enabled state
    Status(PluginStatusArgs),

    /// Enable a bundle
    Enable(PluginToggleArgs),

    /// Disable a bundle
    Disable(PluginToggleArgs),

    /// Inspect and manage capability grants
    Permissions(PluginPermissionsArgs),
}

#[derive(Args, Debug)]
pub struct PluginInfoArgs {
    /// Limit output to one bundle
    #[arg(short, long)]
    pub plugin: Option<String>,

    /// Only show currently enabled bundles
    #[arg(long)]
    pub enabled_only: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PluginStatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PluginToggleArgs {
    /// Bundle id to toggle
    #[arg(short, long)]
    pub plugin: String,

    /// Acting user; must hold the administrative capability
    #[arg(short, long)]
    pub user: String,
}

#[derive(Args, Debug)]
pub struct PluginPermissionsArgs {
    /// Limit output to one bundle's capabilities
    #[arg(short, long)]
    pub plugin: Option<String>,

    /// Sync declared capabilities into the grants store
    #[arg(long)]
    pub sync: bool,

    /// With --sync, also revoke capabilities no bundle declares anymore
    #[arg(long)]
    pub force: bool,

    /// Create one capability group per bundle from its declared grants
    #[arg(long)]
    pub create_groups: bool,

    /// Grant a capability to a user
    #[arg(long, num_args = 2, value_names = ["USER", "CAPABILITY"])]
    pub assign: Option<Vec<String>>,

    /// Revoke a directly granted capability from a user
    #[arg(long, num_args = 2, value_names = ["USER", "CAPABILITY"])]
    pub remove: Option<Vec<String>>,

    /// Show a user's effective capabilities
    #[arg(long, value_name = "USER")]
    pub user_permissions: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
