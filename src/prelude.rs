//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use mirror_warden::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{MwError, Result};

// Integrity
pub use crate::integrity::baseline::{IntegrityOptions, build_baseline};
pub use crate::integrity::manifest::{HashIndex, Manifest};
pub use crate::integrity::scanner::{FileRecord, ScanOptions, scan_tree};
pub use crate::integrity::verify::{Discrepancy, IssueKind, VerifyReport, verify};

// Retention
pub use crate::retention::artifacts::{GroupKey, ReleaseArtifact};
pub use crate::retention::engine::{RetentionOptions, RetentionReport};
pub use crate::retention::version::VersionKey;

// Audit
pub use crate::logger::jsonl::{EventType, Severity};
pub use crate::logger::sink::{AuditEvent, AuditSink, JsonlSink, MemorySink, NullSink};

// Mirror tooling
pub use crate::mirror::download::{DownloadOptions, DownloadReport, download_all};
pub use crate::mirror::client::{ClientOptions, FreezeReport, InstallReport, freeze, install};
