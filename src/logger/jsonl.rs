//! JSONL logger: append-only line-delimited JSON activity log.
//!
//! Every line is one complete JSON object written with a single `write_all`.
//! When the configured file cannot be used, lines go to the fallback file,
//! then to stderr with a `[MW-JSONL]` prefix, and finally nowhere.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::AuditConfig;
use crate::core::errors::{MwError, Result};

/// Severity level for audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Checkpoints at which the maintenance operations emit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStart,
    BaselineWritten,
    ArtifactDeleted,
    ArtifactDeleteFailed,
    VersionUnparsable,
    Discrepancy,
    DownloadRetry,
    DownloadFailed,
    RunSummary,
    Error,
}

impl EventType {
    /// Offset added to `audit.event_id_base`.
    #[must_use]
    pub const fn id_offset(self) -> u32 {
        match self {
            Self::RunStart => 0,
            Self::BaselineWritten => 1,
            Self::ArtifactDeleted => 10,
            Self::ArtifactDeleteFailed => 11,
            Self::VersionUnparsable => 12,
            Self::Discrepancy => 20,
            Self::DownloadRetry => 30,
            Self::DownloadFailed => 31,
            Self::RunSummary => 90,
            Self::Error => 99,
        }
    }
}

/// A single JSONL log entry; all fields optional except `ts`, `source`,
/// `event_id`, `event`, `severity`, `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub source: String,
    pub log_name: String,
    pub event_id: u32,
    pub event: EventType,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(
        audit: &AuditConfig,
        event: EventType,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ts: format_utc_now(),
            source: audit.source.clone(),
            log_name: audit.log_name.clone(),
            event_id: audit.event_id_base.saturating_add(event.id_offset()),
            event,
            severity,
            message: message.into(),
            path: None,
            size: None,
            error_code: None,
        }
    }
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Used when `path` cannot be opened or stops accepting writes.
    pub fallback_path: Option<PathBuf>,
    /// Size at which the active file is rotated. Default: 20 MiB.
    pub max_size_bytes: u64,
    /// Rotated generations kept next to the active file. Default: 5.
    pub max_rotated_files: u32,
}

impl JsonlConfig {
    /// Writer config rooted at `path` with default limits.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: crate::core::config::PathsConfig::default().jsonl_log,
            fallback_path: Some(std::env::temp_dir().join("mwarden.jsonl")),
            max_size_bytes: 20 * 1024 * 1024,
            max_rotated_files: 5,
        }
    }
}

/// Where lines currently go. Each failure moves one step down the chain.
enum Target {
    Primary(BufWriter<File>),
    Fallback(BufWriter<File>),
    Stderr,
    Discard,
}

impl Target {
    const fn label(&self) -> &'static str {
        match self {
            Self::Primary(_) => "normal",
            Self::Fallback(_) => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }

    fn file(&mut self) -> Option<&mut BufWriter<File>> {
        match self {
            Self::Primary(w) | Self::Fallback(w) => Some(w),
            Self::Stderr | Self::Discard => None,
        }
    }
}

/// Append-only activity log with size rotation and a degradation chain.
///
/// A maintenance run never fails because its log cannot be written.
pub struct JsonlWriter {
    config: JsonlConfig,
    target: Target,
    bytes_written: u64,
}

impl JsonlWriter {
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            target: Target::Discard,
            bytes_written: 0,
        };
        match open_append(&writer.config.path) {
            Ok((file, size)) => {
                writer.target = Target::Primary(BufWriter::new(file));
                writer.bytes_written = size;
            }
            Err(err) => writer.fall_back(&err.to_string()),
        }
        writer
    }

    /// Serialize `entry` and append it as one line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.write_line(&line);
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "[MW-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.target.file() {
            let _ = w.flush();
        }
    }

    pub fn state(&self) -> &'static str {
        self.target.label()
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.target.file().is_some() && self.bytes_written + len > self.config.max_size_bytes {
            self.rotate();
        }

        let failed = match &mut self.target {
            Target::Primary(w) | Target::Fallback(w) => w.write_all(line.as_bytes()).err(),
            Target::Stderr => {
                let _ = write!(io::stderr(), "[MW-JSONL] {line}");
                None
            }
            Target::Discard => None,
        };
        match failed {
            None => self.bytes_written += len,
            Some(err) => {
                self.step_down(&err.to_string());
                self.write_line(line);
            }
        }
    }

    /// Move one step down the chain after a write failure.
    fn step_down(&mut self, reason: &str) {
        match self.target {
            Target::Primary(_) => self.fall_back(reason),
            Target::Fallback(_) => {
                let _ = writeln!(io::stderr(), "[MW-JSONL] fallback write failed ({reason}), using stderr");
                self.target = Target::Stderr;
            }
            Target::Stderr | Target::Discard => self.target = Target::Discard,
        }
    }

    fn fall_back(&mut self, reason: &str) {
        let opened = self.config.fallback_path.as_deref().map(|fb| (fb, open_append(fb)));
        match opened {
            Some((fb, Ok((file, size)))) => {
                let _ = writeln!(
                    io::stderr(),
                    "[MW-JSONL] activity log unavailable ({reason}), using fallback {}",
                    fb.display()
                );
                self.target = Target::Fallback(BufWriter::new(file));
                self.bytes_written = size;
            }
            _ => {
                let _ = writeln!(io::stderr(), "[MW-JSONL] activity log unavailable ({reason}), using stderr");
                self.target = Target::Stderr;
            }
        }
    }

    /// Shift `log.N` to `log.N+1`, move the active file to `log.1` and reopen.
    fn rotate(&mut self) {
        self.flush();
        let base = match self.target {
            Target::Primary(_) => self.config.path.clone(),
            Target::Fallback(_) => match &self.config.fallback_path {
                Some(fb) => fb.clone(),
                None => return,
            },
            Target::Stderr | Target::Discard => return,
        };
        let was_primary = matches!(self.target, Target::Primary(_));
        self.target = Target::Discard;

        let keep = self.config.max_rotated_files.max(1);
        let _ = fs::remove_file(rotated_name(&base, keep));
        for generation in (1..keep).rev() {
            let _ = fs::rename(rotated_name(&base, generation), rotated_name(&base, generation + 1));
        }
        let _ = fs::rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                let writer = BufWriter::new(file);
                self.target = if was_primary {
                    Target::Primary(writer)
                } else {
                    Target::Fallback(writer)
                };
                self.bytes_written = 0;
            }
            Err(err) if was_primary => self.fall_back(&err.to_string()),
            Err(_) => self.target = Target::Stderr,
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        if let Some(w) = self.target.file() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
        }
    }
}

// ──────────────────────── helpers ────────────────────────

/// Open `path` for appending, creating parents. Returns the file and its size.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| MwError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| MwError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

fn rotated_name(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────
