//! Verifier: compare a live scan against the stored baseline and classify drift.
//!
//! This detects change between two points in time. It is not a tamper-proof
//! check; whoever can rewrite the mirror can rewrite the manifest too.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::Result;
use crate::core::paths::same_location;
use crate::integrity::baseline::{IntegrityOptions, resolve_run_paths};
use crate::integrity::manifest;
use crate::integrity::scanner::{FileRecord, scan_tree};
use crate::logger::jsonl::EventType;
use crate::logger::sink::{AuditEvent, AuditSink};

/// Classification of a single difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IssueKind {
    /// Recorded in the manifest, absent on disk.
    MissingFile,
    /// On disk, absent from the manifest.
    UnexpectedFile,
    /// Present in both with different content.
    HashMismatch,
    /// The manifest was recorded for a different root.
    MissingManifestEntry,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MissingFile => "MissingFile",
            Self::UnexpectedFile => "UnexpectedFile",
            Self::HashMismatch => "HashMismatch",
            Self::MissingManifestEntry => "MissingManifestEntry",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub root_path: PathBuf,
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    pub detail: String,
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relative_path {
            Some(rel) => write!(f, "{}: {rel} ({})", self.kind, self.detail),
            None => write!(f, "{}: {}", self.kind, self.detail),
        }
    }
}

/// Outcome of one verify run. Drift is reported here, not as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub root_path: PathBuf,
    pub manifest_path: PathBuf,
    /// Files found by the live scan; zero when the root check failed.
    pub checked_files: usize,
    pub issues: Vec<Discrepancy>,
    pub success: bool,
}

impl VerifyReport {
    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}

/// Symmetric difference of two scans keyed by relative path.
///
/// Output is ordered by relative path. A path appears at most once.
pub fn compare(root: &Path, recorded: &[FileRecord], live: &[FileRecord]) -> Vec<Discrepancy> {
    let recorded: BTreeMap<&str, &str> = recorded
        .iter()
        .map(|f| (f.relative_path.as_str(), f.content_hash.as_str()))
        .collect();
    let live: BTreeMap<&str, &str> = live
        .iter()
        .map(|f| (f.relative_path.as_str(), f.content_hash.as_str()))
        .collect();

    let mut keys: Vec<&str> = recorded.keys().chain(live.keys()).copied().collect();
    keys.sort_unstable();
    keys.dedup();

    let issue = |kind, rel: &str, detail: String| Discrepancy {
        root_path: root.to_path_buf(),
        kind,
        relative_path: Some(rel.to_string()),
        detail,
    };

    keys.into_iter()
        .filter_map(|rel| match (recorded.get(rel), live.get(rel)) {
            (Some(_), None) => Some(issue(
                IssueKind::MissingFile,
                rel,
                "file recorded in baseline is missing".to_string(),
            )),
            (None, Some(_)) => Some(issue(
                IssueKind::UnexpectedFile,
                rel,
                "file not present in baseline".to_string(),
            )),
            (Some(expected), Some(actual)) if !expected.eq_ignore_ascii_case(actual) => Some(issue(
                IssueKind::HashMismatch,
                rel,
                format!("expected {expected}, found {actual}"),
            )),
            _ => None,
        })
        .collect()
}

/// Load the manifest, rescan `root` and classify every difference.
///
/// Fatal conditions (unreadable tree, missing or corrupt manifest, manifest
/// outside the root) are errors; drift is carried in the report.
pub fn verify(
    root: &Path,
    manifest_path: &Path,
    options: &IntegrityOptions,
    sink: &mut dyn AuditSink,
) -> Result<VerifyReport> {
    sink.emit(
        AuditEvent::info(EventType::RunStart, "integrity verify started").with_path(root),
    );

    let report = match run_verify(root, manifest_path, options) {
        Ok(report) => report,
        Err(err) => {
            sink.emit(
                AuditEvent::error(EventType::Error, format!("integrity verify failed: {err}"))
                    .with_code(err.code()),
            );
            return Err(err);
        }
    };

    for issue in &report.issues {
        let mut event = AuditEvent::warning(EventType::Discrepancy, issue.to_string());
        if let Some(rel) = &issue.relative_path {
            event = event.with_path(&report.root_path.join(rel));
        }
        sink.emit(event);
    }

    let summary = format!(
        "integrity verify completed for {}: {} files checked, {} issues",
        report.root_path.display(),
        report.checked_files,
        report.issues.len()
    );
    sink.emit(if report.success {
        AuditEvent::info(EventType::RunSummary, summary)
    } else {
        AuditEvent::warning(EventType::RunSummary, summary)
    });

    Ok(report)
}

fn run_verify(root: &Path, manifest_path: &Path, options: &IntegrityOptions) -> Result<VerifyReport> {
    let (root, manifest_path) = resolve_run_paths(root, manifest_path)?;
    let stored = manifest::load(&manifest_path)?;

    let (checked_files, issues) = if same_location(&stored.root_path, &root) {
        let live = scan_tree(&root, &options.scan_options(&root, &manifest_path))?;
        let issues = compare(&root, &stored.files, &live);
        (live.len(), issues)
    } else {
        let mismatch = Discrepancy {
            root_path: root.clone(),
            kind: IssueKind::MissingManifestEntry,
            relative_path: None,
            detail: format!(
                "manifest was recorded for {}, not {}",
                stored.root_path.display(),
                root.display()
            ),
        };
        (0, vec![mismatch])
    };

    Ok(VerifyReport {
        success: issues.is_empty(),
        root_path: root,
        manifest_path,
        checked_files,
        issues,
    })
}
