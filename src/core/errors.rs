//! MW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MwError>;

/// Top-level error type for mirror_warden.
#[derive(Debug, Error)]
pub enum MwError {
    #[error("[MW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[MW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[MW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    /// Operator-supplied arguments contradict each other (manifest outside the
    /// mirror root and similar misuse).
    #[error("[MW-1004] configuration error: {details}")]
    Configuration { details: String },

    #[error("[MW-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[MW-2201] corrupt manifest {path}: {details}")]
    ManifestCorrupt { path: PathBuf, details: String },

    #[error("[MW-2202] manifest not found: {path}")]
    ManifestMissing { path: PathBuf },

    #[error("[MW-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifests are JSON, so every recorded path must be valid UTF-8.
    #[error("[MW-3003] path is not valid UTF-8: {path}")]
    NonUtf8Path { path: PathBuf },

    #[error("[MW-3101] subprocess {program} failed: {details}")]
    Subprocess { program: String, details: String },

    #[error("[MW-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl MwError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "MW-1001",
            Self::MissingConfig { .. } => "MW-1002",
            Self::ConfigParse { .. } => "MW-1003",
            Self::Configuration { .. } => "MW-1004",
            Self::Serialization { .. } => "MW-2101",
            Self::ManifestCorrupt { .. } => "MW-2201",
            Self::ManifestMissing { .. } => "MW-2202",
            Self::Io { .. } => "MW-3002",
            Self::NonUtf8Path { .. } => "MW-3003",
            Self::Subprocess { .. } => "MW-3101",
            Self::Runtime { .. } => "MW-3900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for manifest corruption.
    #[must_use]
    pub fn corrupt(path: impl AsRef<Path>, details: impl Into<String>) -> Self {
        Self::ManifestCorrupt {
            path: path.as_ref().to_path_buf(),
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for MwError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MwError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<MwError> {
        vec![
            MwError::InvalidConfig {
                details: String::new(),
            },
            MwError::MissingConfig {
                path: PathBuf::new(),
            },
            MwError::ConfigParse {
                context: "",
                details: String::new(),
            },
            MwError::Configuration {
                details: String::new(),
            },
            MwError::Serialization {
                context: "",
                details: String::new(),
            },
            MwError::ManifestCorrupt {
                path: PathBuf::new(),
                details: String::new(),
            },
            MwError::ManifestMissing {
                path: PathBuf::new(),
            },
            MwError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            MwError::NonUtf8Path {
                path: PathBuf::new(),
            },
            MwError::Subprocess {
                program: String::new(),
                details: String::new(),
            },
            MwError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(MwError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_carries_code_prefix() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.starts_with(&format!("[{}]", err.code())),
                "display should start with its code: {msg}"
            );
        }
    }

    #[test]
    fn io_convenience_constructor() {
        let err = MwError::io(
            "/tmp/test.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "MW-3002");
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: MwError = json_err.into();
        assert_eq!(err.code(), "MW-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: MwError = toml_err.into();
        assert_eq!(err.code(), "MW-1003");
    }
}
