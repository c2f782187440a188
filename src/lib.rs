#![forbid(unsafe_code)]

//! Mirror Warden (mwarden): maintenance engine for offline package mirrors.
//!
//! Two cores:
//! 1. **Integrity baselines**: SHA-256 manifests of a mirror tree and drift
//!    classification against them
//! 2. **Version retention**: group wheel/sdist artifacts and keep the newest N
//!
//! Around them sit the download worker pool, requirement-list tooling and the
//! Stata ado inventory report. Every operation reports through an
//! [`AuditSink`](logger::sink::AuditSink).
//!
//! # Library usage
//!
//! ```rust,no_run
//! use mirror_warden::prelude::*;
//!
//! let options = IntegrityOptions::default();
//! let root = std::path::Path::new("/srv/pip_mirror");
//! let report = verify(root, &options.default_manifest_path(root), &options, &mut NullSink)?;
//! assert!(report.success);
//! # Ok::<(), MwError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod integrity;
pub mod inventory;
pub mod logger;
pub mod mirror;
pub mod retention;
