//! Bundle management commands
//!
//! The CLI is an administrative surface: it loads the host from
//! manifests alone (no compiled-in hooks), which is enough for
//! metadata, lifecycle state, and manifest-declared capabilities.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use trellis_bundles::{BundleLoader, CapabilityStore, DiagnosticLevel, Host};
use trellis_core::config::TrellisConfig;

use crate::cli::{PluginCommands, PluginToggleArgs};
use crate::output;

mod info;
mod permissions;
mod status;

pub async fn run(command: PluginCommands, config_path: Option<&Path>) -> Result<()> {
    let config = TrellisConfig::load(config_path)?;
    match command {
        PluginCommands::Info(args) => info::run(args, &config),
        PluginCommands::Status(args) => status::run(args, &config),
        PluginCommands::Enable(args) => toggle(args, true, &config).await,
        PluginCommands::Disable(args) => toggle(args, false, &config).await,
        PluginCommands::Permissions(args) => permissions::run(args, &config),
    }
}

/// Load the host over the configured bundles and state directories
pub(crate) fn build_host(config: &TrellisConfig) -> Result<Host> {
    let checker = Arc::new(
        CapabilityStore::new(config.grants_path())
            .context("Failed to open the capability grants store")?,
    );
    Ok(BundleLoader::new(config, checker).load())
}

/// Print load-phase problems; errors loudly, warnings only with -v
pub(crate) fn report_diagnostics(host: &Host) {
    for diagnostic in &host.diagnostics {
        let subject = diagnostic
            .bundle_id
            .as_deref()
            .or(diagnostic.source.as_deref())
            .unwrap_or("load");
        match diagnostic.level {
            DiagnosticLevel::Error => {
                output::error(&format!("{}: {}", subject, diagnostic.message));
            }
            DiagnosticLevel::Warn => {
                tracing::info!("{}: {}", subject, diagnostic.message);
            }
            DiagnosticLevel::Info => {
                tracing::debug!("{}: {}", subject, diagnostic.message);
            }
        }
    }
}

async fn toggle(args: PluginToggleArgs, enable: bool, config: &TrellisConfig) -> Result<()> {
    let host = build_host(config)?;

    let verb = if enable { "enable" } else { "disable" };
    let state = host
        .lifecycle
        .set_enabled(&args.plugin, enable, &args.user)
        .await
        .with_context(|| format!("Failed to {} bundle '{}'", verb, args.plugin))?;

    output::success(&format!(
        "Bundle '{}' {} (changed by {})",
        state.bundle_id,
        if state.enabled { "enabled" } else { "disabled" },
        args.user
    ));

    if enable && !host.is_visible(&args.plugin) {
        output::warning(&format!(
            "Bundle '{}' is enabled but still hidden: a dependency is disabled",
            args.plugin
        ));
    }
    Ok(())
}
