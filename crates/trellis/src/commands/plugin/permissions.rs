//! `plugin permissions` - capability registry and grants management

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use tabled::{Table, Tabled};
use trellis_bundles::CapabilityStore;
use trellis_core::config::TrellisConfig;

use super::{build_host, report_diagnostics};
use crate::cli::PluginPermissionsArgs;
use crate::output;

#[derive(Tabled)]
struct CapabilityRow {
    #[tabled(rename = "Capability")]
    name: String,
    #[tabled(rename = "Bundle")]
    owner: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub fn run(args: PluginPermissionsArgs, config: &TrellisConfig) -> Result<()> {
    let host = build_host(config)?;
    report_diagnostics(&host);

    if let Some(id) = &args.plugin {
        if host.descriptor(id).is_none() {
            bail!("No loaded bundle named '{}'", id);
        }
    }

    let mut grants = CapabilityStore::new(config.grants_path())
        .context("Failed to open the capability grants store")?;
    let mut acted = false;

    if args.sync {
        let declared = declared_capabilities(&host, args.plugin.as_deref());
        let (added, removed) = grants.sync_known(&declared, args.force)?;
        output::success(&format!(
            "Synced capabilities: {} added, {} removed",
            added, removed
        ));
        acted = true;
    }

    if args.create_groups {
        let mut created = 0;
        for descriptor in &host.descriptors {
            if args.plugin.as_deref().is_some_and(|id| id != descriptor.id()) {
                continue;
            }
            let capabilities: BTreeSet<String> = host
                .permissions
                .all(None)
                .iter()
                .filter(|item| item.owner == descriptor.id())
                .map(|item| item.alias.clone())
                .collect();
            if capabilities.is_empty() {
                continue;
            }
            grants.create_group(descriptor.id(), capabilities)?;
            created += 1;
        }
        output::success(&format!("Created {} capability group(s)", created));
        acted = true;
    }

    if let Some(pair) = &args.assign {
        let (user, capability) = (&pair[0], &pair[1]);
        if !grants.known().contains(capability) {
            output::warning(&format!(
                "Capability '{}' is not in the known set (run --sync first?)",
                capability
            ));
        }
        grants.assign(user, capability)?;
        output::success(&format!("Granted '{}' to {}", capability, user));
        acted = true;
    }

    if let Some(pair) = &args.remove {
        let (user, capability) = (&pair[0], &pair[1]);
        if grants.remove(user, capability)? {
            output::success(&format!("Revoked '{}' from {}", capability, user));
        } else {
            output::warning(&format!("{} has no direct grant of '{}'", user, capability));
        }
        acted = true;
    }

    if let Some(user) = &args.user_permissions {
        let effective = grants.user_capabilities(user);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&effective)?);
        } else if effective.is_empty() {
            output::info(&format!("{} holds no capabilities", user));
        } else {
            output::header(&format!("Capabilities of {}", user));
            for capability in &effective {
                println!("  {}", capability);
            }
        }
        return Ok(());
    }

    if acted {
        return Ok(());
    }

    // No action flags: list the capability registry
    let rows: Vec<CapabilityRow> = host
        .permissions
        .all(None)
        .iter()
        .filter(|item| args.plugin.as_deref().is_none_or(|id| item.owner == id))
        .map(|item| CapabilityRow {
            name: item.alias.clone(),
            owner: item.owner.clone(),
            description: item.payload.description.clone(),
        })
        .collect();

    if args.json {
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if rows.is_empty() {
        output::info("No capabilities registered");
    } else {
        println!("{}", Table::new(rows));
    }
    Ok(())
}

fn declared_capabilities(host: &trellis_bundles::Host, plugin: Option<&str>) -> BTreeSet<String> {
    host.permissions
        .all(None)
        .iter()
        .filter(|item| plugin.is_none_or(|id| item.owner == id))
        .map(|item| item.alias.clone())
        .collect()
}
