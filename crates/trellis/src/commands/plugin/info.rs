//! `plugin info` - discovered bundle metadata

use anyhow::Result;
use serde::Serialize;
use tabled::{Table, Tabled};
use trellis_core::config::TrellisConfig;
use trellis_core::types::BundleDescriptor;

use super::{build_host, report_diagnostics};
use crate::cli::PluginInfoArgs;
use crate::output;

#[derive(Tabled)]
struct InfoRow {
    #[tabled(rename = "Bundle")]
    id: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Dependencies")]
    dependencies: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Serialize)]
struct InfoEntry<'a> {
    #[serde(flatten)]
    descriptor: &'a BundleDescriptor,
    effective_enabled: bool,
}

pub fn run(args: PluginInfoArgs, config: &TrellisConfig) -> Result<()> {
    let host = build_host(config)?;
    report_diagnostics(&host);

    let selected: Vec<&BundleDescriptor> = host
        .descriptors
        .iter()
        .filter(|d| args.plugin.as_deref().is_none_or(|id| d.id() == id))
        .filter(|d| !args.enabled_only || host.lifecycle.is_enabled(d.id()))
        .collect();

    if let Some(id) = &args.plugin {
        if selected.is_empty() {
            output::warning(&format!("No loaded bundle named '{}'", id));
            return Ok(());
        }
    }

    if args.json {
        let entries: Vec<InfoEntry> = selected
            .iter()
            .map(|d| InfoEntry {
                descriptor: d,
                effective_enabled: host.lifecycle.is_enabled(d.id()),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if selected.is_empty() {
        output::info("No bundles discovered");
        return Ok(());
    }

    // Single-bundle selection gets the detailed view
    if let [descriptor] = selected.as_slice() {
        output::header(&format!("Bundle: {}", descriptor.id()));
        output::kv("Version", &descriptor.version);
        output::kv(
            "Enabled",
            if host.lifecycle.is_enabled(descriptor.id()) {
                "yes"
            } else {
                "no"
            },
        );
        if !descriptor.description.is_empty() {
            output::kv("Description", &descriptor.description);
        }
        if let Some(author) = &descriptor.author {
            output::kv("Author", author);
        }
        if let Some(email) = &descriptor.email {
            output::kv("Email", email);
        }
        if let Some(url) = &descriptor.url {
            output::kv("URL", url);
        }
        if !descriptor.categories.is_empty() {
            output::kv("Categories", &descriptor.categories.join(", "));
        }
        if !descriptor.tags.is_empty() {
            output::kv("Tags", &descriptor.tags.join(", "));
        }
        if !descriptor.dependencies.is_empty() {
            output::kv("Dependencies", &descriptor.dependencies.join(", "));
        }
        if !descriptor.permissions.is_empty() {
            println!("\nDeclared capabilities:");
            for permission in &descriptor.permissions {
                output::kv(&permission.name, &permission.description);
            }
        }
        return Ok(());
    }

    let rows: Vec<InfoRow> = selected
        .iter()
        .map(|d| InfoRow {
            id: d.id().to_string(),
            version: d.version.clone(),
            enabled: if host.lifecycle.is_enabled(d.id()) {
                "yes".to_string()
            } else {
                "no".to_string()
            },
            dependencies: d.dependencies.join(", "),
            description: d.description.clone(),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}
