//! Version-retention engine: keep the newest N artifacts per group, delete the rest.
//!
//! Pipeline: list directory -> recognize artifacts -> group -> sort each group
//! newest first -> delete everything past `keep`.
//!
//! Only the immediate directory is listed. Files that match neither grammar
//! are reported as unmatched and never touched. Deletions are irreversible; a
//! baseline taken before a run no longer describes the mirror after it.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::RetentionConfig;
use crate::core::errors::{MwError, Result};
use crate::logger::jsonl::EventType;
use crate::logger::sink::{AuditEvent, AuditSink};
use crate::retention::artifacts::{ArtifactKind, GroupKey, ReleaseArtifact};

// ──────────────────── configuration ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionOptions {
    /// Versions kept per group. Values below 1 are treated as 1, so the
    /// newest artifact of a group is never deleted.
    pub keep: usize,
    /// Report victims without deleting them.
    pub dry_run: bool,
}

impl Default for RetentionOptions {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

impl From<&RetentionConfig> for RetentionOptions {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            keep: config.keep,
            dry_run: config.dry_run,
        }
    }
}

// ──────────────────── plan ────────────────────

/// One group, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactGroup {
    pub key: GroupKey,
    pub artifacts: Vec<ReleaseArtifact>,
}

impl ArtifactGroup {
    /// Artifacts retained under `keep`.
    pub fn retained(&self, keep: usize) -> &[ReleaseArtifact] {
        &self.artifacts[..keep.min(self.artifacts.len())]
    }

    /// Artifacts past the retention window.
    pub fn surplus(&self, keep: usize) -> &[ReleaseArtifact] {
        &self.artifacts[keep.min(self.artifacts.len())..]
    }
}

/// Everything found in one directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub directory: PathBuf,
    /// Ordered by group key; binary groups first.
    pub groups: Vec<ArtifactGroup>,
    /// Regular files matching neither grammar.
    pub unmatched: Vec<PathBuf>,
}

impl RetentionPlan {
    pub fn groups_of(&self, kind: ArtifactKind) -> impl Iterator<Item = &ArtifactGroup> {
        self.groups.iter().filter(move |g| g.key.kind() == kind)
    }

    /// Artifacts whose version string did not parse.
    pub fn unparsable(&self) -> impl Iterator<Item = &ReleaseArtifact> {
        self.groups
            .iter()
            .flat_map(|g| g.artifacts.iter())
            .filter(|a| !a.version.is_valid())
    }
}

/// Group the artifacts in `artifacts` and order each group newest first.
pub fn group_artifacts(artifacts: Vec<ReleaseArtifact>) -> Vec<ArtifactGroup> {
    let mut grouped: BTreeMap<GroupKey, Vec<ReleaseArtifact>> = BTreeMap::new();
    for artifact in artifacts {
        grouped.entry(artifact.group_key()).or_default().push(artifact);
    }

    grouped
        .into_iter()
        .map(|(key, mut artifacts)| {
            artifacts.sort_by(|a, b| {
                b.version
                    .cmp(&a.version)
                    .then_with(|| a.file_path.cmp(&b.file_path))
            });
            ArtifactGroup { key, artifacts }
        })
        .collect()
}

/// List `dir` (non-recursively) and group what it contains.
pub fn plan(dir: &Path) -> Result<RetentionPlan> {
    let entries = fs::read_dir(dir).map_err(|source| MwError::io(dir, source))?;

    let mut artifacts = Vec::new();
    let mut unmatched = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| MwError::io(dir, source))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|source| MwError::io(&path, source))?;
        if !file_type.is_file() {
            continue;
        }
        match ReleaseArtifact::from_path(&path) {
            Some(artifact) => artifacts.push(artifact),
            None => unmatched.push(path),
        }
    }
    unmatched.sort();

    Ok(RetentionPlan {
        directory: dir.to_path_buf(),
        groups: group_artifacts(artifacts),
        unmatched,
    })
}

// ──────────────────── report ────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionFailure {
    pub path: PathBuf,
    pub error: String,
    pub error_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub groups_examined: usize,
    pub groups_pruned: usize,
    /// Deleted, or in dry-run mode, would have been.
    pub deleted: Vec<PathBuf>,
    pub kept: usize,
    pub bytes_freed: u64,
    pub failures: Vec<DeletionFailure>,
    pub unmatched: usize,
    pub dry_run: bool,
}

// ──────────────────── executor ────────────────────

/// Delete every artifact past the retention window of its group.
///
/// A failed deletion is recorded and the run continues.
pub fn execute(
    plan: &RetentionPlan,
    options: RetentionOptions,
    sink: &mut dyn AuditSink,
) -> RetentionReport {
    let keep = options.keep.max(1);
    let mut report = RetentionReport {
        groups_examined: plan.groups.len(),
        unmatched: plan.unmatched.len(),
        dry_run: options.dry_run,
        ..RetentionReport::default()
    };

    for artifact in plan.unparsable() {
        sink.emit(
            AuditEvent::warning(
                EventType::VersionUnparsable,
                format!(
                    "version {:?} of {} is not PEP 440; sorted as oldest",
                    artifact.version.as_str(),
                    artifact.file_name()
                ),
            )
            .with_path(&artifact.file_path),
        );
    }

    for group in &plan.groups {
        report.kept += group.retained(keep).len();
        let surplus = group.surplus(keep);
        if surplus.is_empty() {
            continue;
        }
        report.groups_pruned += 1;

        for artifact in surplus {
            let size = fs::metadata(&artifact.file_path).map_or(0, |m| m.len());
            if options.dry_run {
                sink.emit(
                    AuditEvent::info(
                        EventType::ArtifactDeleted,
                        format!("dry-run: would delete {} from {}", artifact.file_name(), group.key),
                    )
                    .with_path(&artifact.file_path)
                    .with_size(size),
                );
                report.deleted.push(artifact.file_path.clone());
                report.bytes_freed += size;
                continue;
            }

            match fs::remove_file(&artifact.file_path) {
                Ok(()) => {
                    sink.emit(
                        AuditEvent::info(
                            EventType::ArtifactDeleted,
                            format!("deleted {} from {}", artifact.file_name(), group.key),
                        )
                        .with_path(&artifact.file_path)
                        .with_size(size),
                    );
                    report.deleted.push(artifact.file_path.clone());
                    report.bytes_freed += size;
                }
                Err(source) => {
                    let err = MwError::io(&artifact.file_path, source);
                    sink.emit(
                        AuditEvent::error(
                            EventType::ArtifactDeleteFailed,
                            format!("failed to delete {}: {err}", artifact.file_name()),
                        )
                        .with_path(&artifact.file_path)
                        .with_code(err.code()),
                    );
                    report.failures.push(DeletionFailure {
                        path: artifact.file_path.clone(),
                        error: err.to_string(),
                        error_code: err.code().to_string(),
                    });
                }
            }
        }
    }

    report
}

/// Plan and execute retention for `dir`, reporting start and summary events.
///
/// Only an unreadable directory is an error.
pub fn run(dir: &Path, options: RetentionOptions, sink: &mut dyn AuditSink) -> Result<RetentionReport> {
    sink.emit(
        AuditEvent::info(
            EventType::RunStart,
            format!(
                "retention started (keep {}{})",
                options.keep.max(1),
                if options.dry_run { ", dry-run" } else { "" }
            ),
        )
        .with_path(dir),
    );

    let plan = match plan(dir) {
        Ok(plan) => plan,
        Err(err) => {
            sink.emit(
                AuditEvent::error(EventType::Error, format!("retention failed: {err}"))
                    .with_code(err.code()),
            );
            return Err(err);
        }
    };

    let report = execute(&plan, options, sink);

    let summary = format!(
        "retention completed for {}: {} groups, {} {}, {} kept, {} failed",
        dir.display(),
        report.groups_examined,
        report.deleted.len(),
        if report.dry_run { "would be deleted" } else { "deleted" },
        report.kept,
        report.failures.len()
    );
    sink.emit(if report.failures.is_empty() {
        AuditEvent::info(EventType::RunSummary, summary)
    } else {
        AuditEvent::warning(EventType::RunSummary, summary)
    });

    Ok(report)
}
