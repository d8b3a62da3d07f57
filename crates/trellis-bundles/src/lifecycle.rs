//! Lifecycle store — persisted enable/disable state per bundle
//!
//! An append-only JSONL ledger at `<state_dir>/lifecycle_ledger.jsonl`;
//! the newest record per bundle wins, older records stay as the audit
//! trail. Appends take an exclusive file lock and fsync, so concurrent
//! admin processes cannot interleave partial lines. Reads hit the file
//! per call: workers pick up another process's toggle on their next
//! query instead of caching a stale decision.
//!
//! If the ledger cannot be read, queries degrade to the manifest
//! defaults rather than failing request handling.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;
use trellis_core::error::{Error, Result};
use trellis_core::types::{CallerContext, LifecycleState};

use crate::capability::CapabilityCheck;

/// One persisted lifecycle change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRecord {
    /// Unique record id (UUID v4)
    pub record_id: String,

    pub bundle_id: String,
    pub enabled: bool,
    pub changed_by: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Observer invoked synchronously after a successful state change
pub type ChangeObserver = Box<dyn Fn(&LifecycleState) + Send + Sync>;

/// Process-wide enable/disable state with an audit trail
pub struct LifecycleStore {
    ledger_path: PathBuf,

    /// Manifest defaults, seeded by the loader
    defaults: HashMap<String, bool>,

    observers: Vec<ChangeObserver>,

    checker: Arc<dyn CapabilityCheck>,
    admin_capability: String,
    check_timeout: Duration,
}

impl LifecycleStore {
    pub fn new(
        ledger_path: PathBuf,
        checker: Arc<dyn CapabilityCheck>,
        admin_capability: impl Into<String>,
        check_timeout: Duration,
    ) -> Self {
        Self {
            ledger_path,
            defaults: HashMap::new(),
            observers: Vec::new(),
            checker,
            admin_capability: admin_capability.into(),
            check_timeout,
        }
    }

    /// Seed the manifest default for a bundle (loader only; never writes
    /// the ledger)
    pub fn seed_default(&mut self, bundle_id: impl Into<String>, declared_enabled: bool) {
        self.defaults.insert(bundle_id.into(), declared_enabled);
    }

    /// Whether the store knows this bundle
    pub fn knows(&self, bundle_id: &str) -> bool {
        self.defaults.contains_key(bundle_id)
    }

    /// Resolved enabled state: persisted override if present, else the
    /// manifest default; unknown bundles are disabled
    pub fn is_enabled(&self, bundle_id: &str) -> bool {
        let records = self.latest_records_or_empty();
        match records.get(bundle_id) {
            Some(record) => record.enabled,
            None => self.defaults.get(bundle_id).copied().unwrap_or(false),
        }
    }

    /// Change a bundle's enabled state
    ///
    /// Fails with [`Error::UnknownBundle`] for ids never discovered and
    /// [`Error::Unauthorized`] when the actor lacks the administrative
    /// capability (a failed or timed-out check counts as lacking it).
    pub async fn set_enabled(
        &self,
        bundle_id: &str,
        enabled: bool,
        actor: &str,
    ) -> Result<LifecycleState> {
        if !self.knows(bundle_id) {
            return Err(Error::unknown_bundle(bundle_id));
        }

        let ctx = CallerContext::for_actor(actor);
        let authorized = match tokio::time::timeout(
            self.check_timeout,
            self.checker.check(&ctx, &self.admin_capability),
        )
        .await
        {
            Ok(Ok(held)) => held,
            Ok(Err(e)) => {
                warn!("Capability check failed for actor '{}': {}", actor, e);
                false
            }
            Err(_) => {
                warn!("Capability check timed out for actor '{}'", actor);
                false
            }
        };
        if !authorized {
            return Err(Error::unauthorized(actor));
        }

        let record = LifecycleRecord {
            record_id: uuid::Uuid::new_v4().to_string(),
            bundle_id: bundle_id.to_string(),
            enabled,
            changed_by: Some(actor.to_string()),
            changed_at: Utc::now(),
        };
        self.append(&record)?;

        let state = LifecycleState {
            bundle_id: record.bundle_id.clone(),
            enabled: record.enabled,
            changed_by: record.changed_by.clone(),
            changed_at: Some(record.changed_at),
        };
        for observer in &self.observers {
            observer(&state);
        }
        Ok(state)
    }

    /// Register a change observer; invoked synchronously, in
    /// registration order, after each successful write
    pub fn on_change(&mut self, observer: ChangeObserver) {
        self.observers.push(observer);
    }

    /// Resolved state for every known bundle, sorted by id
    pub fn list_states(&self) -> Vec<LifecycleState> {
        let records = self.latest_records_or_empty();
        let mut states: Vec<LifecycleState> = self
            .defaults
            .iter()
            .map(|(bundle_id, &declared)| match records.get(bundle_id) {
                Some(record) => LifecycleState {
                    bundle_id: bundle_id.clone(),
                    enabled: record.enabled,
                    changed_by: record.changed_by.clone(),
                    changed_at: Some(record.changed_at),
                },
                None => LifecycleState {
                    bundle_id: bundle_id.clone(),
                    enabled: declared,
                    changed_by: None,
                    changed_at: None,
                },
            })
            .collect();
        states.sort_by(|a, b| a.bundle_id.cmp(&b.bundle_id));
        states
    }

    /// Persisted states whose bundle no longer exists on disk
    ///
    /// Reported for audit purposes, never auto-deleted.
    pub fn orphaned_states(&self) -> Vec<LifecycleState> {
        let records = self.latest_records_or_empty();
        let mut orphans: Vec<LifecycleState> = records
            .values()
            .filter(|record| !self.defaults.contains_key(&record.bundle_id))
            .map(|record| LifecycleState {
                bundle_id: record.bundle_id.clone(),
                enabled: record.enabled,
                changed_by: record.changed_by.clone(),
                changed_at: Some(record.changed_at),
            })
            .collect();
        orphans.sort_by(|a, b| a.bundle_id.cmp(&b.bundle_id));
        orphans
    }

    /// Full audit history for one bundle, chronological
    pub fn history(&self, bundle_id: &str) -> Result<Vec<LifecycleRecord>> {
        Ok(self
            .read_records()?
            .into_iter()
            .filter(|record| record.bundle_id == bundle_id)
            .collect())
    }

    /// Append a record under an exclusive lock, fsynced before return
    fn append(&self, record: &LifecycleRecord) -> Result<()> {
        if let Some(parent) = self.ledger_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger_path)?;
        file.lock_exclusive()?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
        file.sync_all()?;
        // Lock released when `file` drops
        Ok(())
    }

    fn read_records(&self) -> Result<Vec<LifecycleRecord>> {
        if !self.ledger_path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.ledger_path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Latest record per bundle; a broken ledger degrades to "no
    /// overrides" so reads keep working on manifest defaults
    fn latest_records_or_empty(&self) -> HashMap<String, LifecycleRecord> {
        let records = match self.read_records() {
            Ok(records) => records,
            Err(e) => {
                warn!("Lifecycle ledger unreadable, using defaults: {}", e);
                return HashMap::new();
            }
        };
        let mut latest: HashMap<String, LifecycleRecord> = HashMap::new();
        for record in records {
            match latest.get(&record.bundle_id) {
                Some(existing) if existing.changed_at > record.changed_at => {}
                _ => {
                    latest.insert(record.bundle_id.clone(), record);
                }
            }
        }
        latest
    }
}
