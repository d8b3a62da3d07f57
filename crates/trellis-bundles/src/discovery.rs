//! Bundle discovery — scans the bundles root for manifests
//!
//! A failing manifest never aborts the scan; its error becomes a
//! per-bundle diagnostic and the remaining candidates are still parsed.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use trellis_core::types::BundleDescriptor;

use crate::manifest::{load_manifest, BUNDLE_MANIFEST_FILENAME};

/// A discovered bundle before loading
#[derive(Debug, Clone)]
pub struct DiscoveredBundle {
    pub descriptor: BundleDescriptor,
    pub dir: PathBuf,
}

/// Severity of a load-phase diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warn,
    Error,
}

/// One per-bundle problem recorded during discovery or loading
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub bundle_id: Option<String>,
    pub source: Option<String>,
    pub message: String,
}

/// Result of a discovery scan
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub bundles: Vec<DiscoveredBundle>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Scan `root` for subdirectories containing a bundle manifest
///
/// Candidates are visited in directory-name order so repeated scans of
/// the same tree produce the same report. Hidden directories are
/// skipped. A duplicate bundle id keeps the first occurrence and
/// records an error diagnostic for the later one.
pub fn discover_bundles(root: &Path) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Bundles root {:?} is not readable: {}", root, e);
            return report;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('.'))
        })
        .filter(|path| path.join(BUNDLE_MANIFEST_FILENAME).exists())
        .collect();
    candidates.sort();

    for dir in candidates {
        match load_manifest(&dir) {
            Ok(descriptor) => {
                if report
                    .bundles
                    .iter()
                    .any(|b| b.descriptor.id() == descriptor.id())
                {
                    report.diagnostics.push(Diagnostic {
                        level: DiagnosticLevel::Error,
                        bundle_id: Some(descriptor.id().to_string()),
                        source: Some(dir.display().to_string()),
                        message: format!("duplicate bundle id '{}', skipped", descriptor.id()),
                    });
                    continue;
                }
                debug!("Discovered bundle '{}' at {:?}", descriptor.id(), dir);
                report.bundles.push(DiscoveredBundle { descriptor, dir });
            }
            Err(e) => {
                report.diagnostics.push(Diagnostic {
                    level: DiagnosticLevel::Error,
                    bundle_id: None,
                    source: Some(dir.display().to_string()),
                    message: e.to_string(),
                });
            }
        }
    }

    report
}
