//! Baseline builder: scan a mirror root and record it as the trusted manifest.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::core::config::IntegrityConfig;
use crate::core::errors::{MwError, Result};
use crate::core::paths::{is_within, resolve_absolute_path};
use crate::integrity::manifest::{self, Manifest};
use crate::integrity::scanner::{ScanOptions, scan_tree};
use crate::logger::jsonl::EventType;
use crate::logger::sink::{AuditEvent, AuditSink};

/// Exclusion and naming settings shared by baseline and verify runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityOptions {
    pub manifest_file_name: String,
    pub excluded_extensions: Vec<String>,
    /// Relative entries are resolved against the mirror root.
    pub excluded_paths: Vec<PathBuf>,
}

impl Default for IntegrityOptions {
    fn default() -> Self {
        Self::from(&IntegrityConfig::default())
    }
}

impl From<&IntegrityConfig> for IntegrityOptions {
    fn from(config: &IntegrityConfig) -> Self {
        Self {
            manifest_file_name: config.manifest_file_name.clone(),
            excluded_extensions: config.excluded_extensions.clone(),
            excluded_paths: config.excluded_paths.clone(),
        }
    }
}

impl IntegrityOptions {
    /// Where the manifest lives when no explicit path is given.
    pub fn default_manifest_path(&self, root: &Path) -> PathBuf {
        root.join(&self.manifest_file_name)
    }

    /// Scanner exclusions for `root`; the manifest itself is always excluded.
    pub fn scan_options(&self, root: &Path, manifest_path: &Path) -> ScanOptions {
        let mut excluded_paths: Vec<PathBuf> = self
            .excluded_paths
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
            .collect();
        excluded_paths.push(manifest_path.to_path_buf());

        ScanOptions {
            excluded_paths,
            excluded_extensions: self.excluded_extensions.clone(),
        }
    }
}

/// Resolve both paths and check that the manifest lives inside the root.
pub(crate) fn resolve_run_paths(root: &Path, manifest_path: &Path) -> Result<(PathBuf, PathBuf)> {
    let root = resolve_absolute_path(root);
    let manifest_path = resolve_absolute_path(manifest_path);
    if !is_within(&manifest_path, &root) {
        return Err(MwError::Configuration {
            details: format!(
                "manifest {} is outside mirror root {}",
                manifest_path.display(),
                root.display()
            ),
        });
    }
    Ok((root, manifest_path))
}

/// Scan `root` and overwrite the manifest at `manifest_path`.
///
/// Re-running is idempotent up to the timestamp; nothing from a previous
/// manifest is merged.
pub fn build_baseline(
    root: &Path,
    manifest_path: &Path,
    options: &IntegrityOptions,
    sink: &mut dyn AuditSink,
) -> Result<Manifest> {
    sink.emit(
        AuditEvent::info(EventType::RunStart, "integrity baseline started").with_path(root),
    );

    let result = write_baseline(root, manifest_path, options);
    match &result {
        Ok(manifest) => {
            sink.emit(
                AuditEvent::info(
                    EventType::BaselineWritten,
                    format!("baseline recorded {} files", manifest.file_count()),
                )
                .with_path(manifest_path),
            );
            sink.emit(AuditEvent::info(
                EventType::RunSummary,
                format!(
                    "integrity baseline completed for {}: {} files",
                    manifest.root_path.display(),
                    manifest.file_count()
                ),
            ));
        }
        Err(err) => {
            sink.emit(
                AuditEvent::error(EventType::Error, format!("integrity baseline failed: {err}"))
                    .with_code(err.code()),
            );
        }
    }
    result
}

fn write_baseline(
    root: &Path,
    manifest_path: &Path,
    options: &IntegrityOptions,
) -> Result<Manifest> {
    let (root, manifest_path) = resolve_run_paths(root, manifest_path)?;
    let files = scan_tree(&root, &options.scan_options(&root, &manifest_path))?;
    let manifest = Manifest::new(Utc::now(), root, files);
    manifest::save(&manifest, &manifest_path)?;
    Ok(manifest)
}
