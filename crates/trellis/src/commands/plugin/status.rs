//! `plugin status` - resolved enabled state per bundle

use anyhow::Result;
use tabled::{Table, Tabled};
use trellis_core::config::TrellisConfig;
use trellis_core::types::LifecycleState;

use super::{build_host, report_diagnostics};
use crate::cli::PluginStatusArgs;
use crate::output;

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Bundle")]
    id: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Visible")]
    visible: String,
    #[tabled(rename = "Changed by")]
    changed_by: String,
    #[tabled(rename = "Changed at")]
    changed_at: String,
}

fn row(state: &LifecycleState, visible: bool) -> StatusRow {
    StatusRow {
        id: state.bundle_id.clone(),
        enabled: if state.enabled { "yes" } else { "no" }.to_string(),
        visible: if visible { "yes" } else { "no" }.to_string(),
        changed_by: state.changed_by.clone().unwrap_or_else(|| "-".to_string()),
        changed_at: state
            .changed_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string()),
    }
}

pub fn run(args: PluginStatusArgs, config: &TrellisConfig) -> Result<()> {
    let host = build_host(config)?;
    report_diagnostics(&host);

    let states = host.lifecycle.list_states();
    let orphans = host.lifecycle.orphaned_states();

    if args.json {
        let payload = serde_json::json!({
            "bundles": states,
            "orphaned": orphans,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if states.is_empty() {
        output::info("No bundles discovered");
    } else {
        let rows: Vec<StatusRow> = states
            .iter()
            .map(|state| row(state, host.is_visible(&state.bundle_id)))
            .collect();
        println!("{}", Table::new(rows));
    }

    for orphan in &orphans {
        output::warning(&format!(
            "Persisted state for '{}' has no bundle on disk",
            orphan.bundle_id
        ));
    }
    Ok(())
}
