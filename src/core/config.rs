//! Configuration system: TOML file + env var overrides + smart defaults.
//!
//! The loaded [`Config`] is an immutable value handed to each operation; no
//! module reads settings from ambient global state.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{MwError, Result};

/// Full mirror_warden configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub integrity: IntegrityConfig,
    pub retention: RetentionConfig,
    pub download: DownloadConfig,
    pub client: ClientConfig,
    pub audit: AuditConfig,
    pub paths: PathsConfig,
}

/// Baseline/verify scan settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Manifest file name used when `--manifest` is not given; lives in the mirror root.
    pub manifest_file_name: String,
    /// Extensions (without the dot, case-insensitive) never recorded in a baseline.
    pub excluded_extensions: Vec<String>,
    /// Extra exclusions; relative entries are resolved against the mirror root.
    pub excluded_paths: Vec<PathBuf>,
}

/// Version-retention settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionConfig {
    /// Versions kept per artifact group.
    pub keep: usize,
    /// Report what would be deleted without touching the filesystem.
    pub dry_run: bool,
}

/// Mirror download orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownloadConfig {
    /// Package-manager launcher.
    pub program: String,
    /// Argument template; `{requirement}` and `{dest}` are expanded per job.
    pub args: Vec<String>,
    /// Fixed worker-pool size.
    pub workers: usize,
    /// Additional attempts after a failed invocation.
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Environment variables removed from every child process.
    pub removed_env: Vec<String>,
}

/// Package manager used on client machines by `freeze` and `install`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub program: String,
    /// Arguments that print installed packages in requirements format.
    pub freeze_args: Vec<String>,
    /// Install template; `{mirror}` and `{requirements}` are expanded to absolute paths.
    pub install_args: Vec<String>,
    pub removed_env: Vec<String>,
}

/// Identifiers stamped on every audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditConfig {
    /// Event source name (the Windows Event Log "source" in the PowerShell tooling).
    pub source: String,
    /// Event log channel name.
    pub log_name: String,
    /// Event ids are `event_id_base + offset` per event kind.
    pub event_id_base: u32,
}

/// Filesystem paths used by mwarden.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            manifest_file_name: "integrity-baseline.json".to_string(),
            excluded_extensions: vec!["tmp".to_string(), "log".to_string(), "bak".to_string()],
            excluded_paths: Vec::new(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep: 3,
            dry_run: false,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            program: "py".to_string(),
            args: ["-m", "pip", "download", "--no-deps", "-d", "{dest}", "{requirement}"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            workers: 4,
            retries: 2,
            retry_delay_ms: 2_000,
            removed_env: vec!["PIP_NO_INDEX".to_string()],
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        Self {
            program: "py".to_string(),
            freeze_args: strings(&["-m", "pip", "freeze"]),
            install_args: strings(&[
                "-m",
                "pip",
                "install",
                "--no-index",
                "--find-links={mirror}",
                "-r",
                "{requirements}",
                "--force-reinstall",
                "--no-deps",
            ]),
            removed_env: vec!["PIP_NO_INDEX".to_string()],
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            source: "MirrorWarden".to_string(),
            log_name: "Application".to_string(),
            event_id_base: 1000,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = home_dir();
        Self {
            config_file: home_dir.join(".config").join("mwarden").join("config.toml"),
            jsonl_log: home_dir
                .join(".local")
                .join("share")
                .join("mwarden")
                .join("activity.jsonl"),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map_or_else(
            || {
                eprintln!("[MW-CONFIG] WARNING: HOME not set, falling back to temp dir for data paths");
                env::temp_dir()
            },
            PathBuf::from,
        )
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| MwError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(MwError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MwError::Serialization {
            context: "toml",
            details: e.to_string(),
        })
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("MW_INTEGRITY_MANIFEST_FILE_NAME") {
            self.integrity.manifest_file_name = raw;
        }
        if let Some(raw) = lookup("MW_INTEGRITY_EXCLUDED_EXTENSIONS") {
            self.integrity.excluded_extensions = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(raw) = lookup("MW_RETENTION_KEEP") {
            self.retention.keep = parse_env("MW_RETENTION_KEEP", &raw)?;
        }
        if let Some(raw) = lookup("MW_RETENTION_DRY_RUN") {
            self.retention.dry_run = parse_env("MW_RETENTION_DRY_RUN", &raw)?;
        }

        if let Some(raw) = lookup("MW_DOWNLOAD_PROGRAM") {
            self.download.program = raw;
        }
        if let Some(raw) = lookup("MW_DOWNLOAD_WORKERS") {
            self.download.workers = parse_env("MW_DOWNLOAD_WORKERS", &raw)?;
        }
        if let Some(raw) = lookup("MW_DOWNLOAD_RETRIES") {
            self.download.retries = parse_env("MW_DOWNLOAD_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("MW_DOWNLOAD_RETRY_DELAY_MS") {
            self.download.retry_delay_ms = parse_env("MW_DOWNLOAD_RETRY_DELAY_MS", &raw)?;
        }

        if let Some(raw) = lookup("MW_CLIENT_PROGRAM") {
            self.client.program = raw;
        }

        if let Some(raw) = lookup("MW_AUDIT_SOURCE") {
            self.audit.source = raw;
        }
        if let Some(raw) = lookup("MW_AUDIT_EVENT_ID_BASE") {
            self.audit.event_id_base = parse_env("MW_AUDIT_EVENT_ID_BASE", &raw)?;
        }

        if let Some(raw) = lookup("MW_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Extensions are stored lowercase and without the leading dot.
    fn normalize(&mut self) {
        for ext in &mut self.integrity.excluded_extensions {
            *ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        }
        self.integrity.excluded_extensions.sort();
        self.integrity.excluded_extensions.dedup();
    }

    fn validate(&self) -> Result<()> {
        let name = self.integrity.manifest_file_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(MwError::InvalidConfig {
                details: format!(
                    "integrity.manifest_file_name must be a bare file name, got {:?}",
                    self.integrity.manifest_file_name
                ),
            });
        }

        for ext in &self.integrity.excluded_extensions {
            if ext.is_empty() || ext.contains(['/', '\\']) {
                return Err(MwError::InvalidConfig {
                    details: format!("integrity.excluded_extensions has invalid entry {ext:?}"),
                });
            }
        }

        if self.retention.keep == 0 {
            return Err(MwError::InvalidConfig {
                details: "retention.keep must be >= 1".to_string(),
            });
        }

        if self.download.workers == 0 {
            return Err(MwError::InvalidConfig {
                details: "download.workers must be >= 1".to_string(),
            });
        }
        if self.download.program.trim().is_empty() {
            return Err(MwError::InvalidConfig {
                details: "download.program must not be empty".to_string(),
            });
        }
        if !self.download.args.iter().any(|a| a.contains("{requirement}")) {
            return Err(MwError::InvalidConfig {
                details: "download.args must reference {requirement}".to_string(),
            });
        }

        if self.client.program.trim().is_empty() {
            return Err(MwError::InvalidConfig {
                details: "client.program must not be empty".to_string(),
            });
        }
        if !self.client.install_args.iter().any(|a| a.contains("{requirements}")) {
            return Err(MwError::InvalidConfig {
                details: "client.install_args must reference {requirements}".to_string(),
            });
        }

        if self.audit.source.trim().is_empty() {
            return Err(MwError::InvalidConfig {
                details: "audit.source must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| MwError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
