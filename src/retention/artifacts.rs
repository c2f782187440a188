//! Release-artifact file name grammars.
//!
//! Binary: `<name>-<version>[-<build>]-<tag>[-<abi>]-<platform>.whl`
//! Source: `<name>-<version>.{tar.gz,tar.bz2,zip}`
//!
//! The grammars never both match one file name: they are told apart by
//! extension.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::retention::version::VersionKey;

static WHEEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<name>[^-]+)-(?P<version>\d[^-]*)(?:-(?P<build>\d[^-]*))?-(?P<tag>[^-]+)(?:-(?P<abi>[^-]+))?-(?P<platform>[^-]+)\.whl$",
    )
    .expect("wheel pattern compiles")
});

static SDIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.+?)-(?P<version>\d[^-]*?)\.(?P<ext>tar\.gz|tar\.bz2|zip)$")
        .expect("sdist pattern compiles")
});

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("separator pattern compiles"));

/// Canonical package name: lowercase, runs of `-`, `_` and `.` collapsed to `-`.
pub fn normalize_package_name(name: &str) -> String {
    NAME_SEPARATORS
        .replace_all(name.trim(), "-")
        .to_ascii_lowercase()
}

/// Which partition an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Binary,
    Source,
}

/// Retention group. Binary and source artifacts never share a group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Binary { name: String, tag: String },
    Source { name: String },
}

impl GroupKey {
    pub const fn kind(&self) -> ArtifactKind {
        match self {
            Self::Binary { .. } => ArtifactKind::Binary,
            Self::Source { .. } => ArtifactKind::Source,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary { name, tag } => write!(f, "{name} ({tag})"),
            Self::Source { name } => write!(f, "{name} (source)"),
        }
    }
}

/// A package file recognized by one of the grammars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseArtifact {
    /// Name as written in the file name.
    pub package_name: String,
    /// Interpreter tag; binary artifacts only.
    pub interpreter_tag: Option<String>,
    pub version: VersionKey,
    pub file_path: PathBuf,
}

impl ReleaseArtifact {
    /// Recognize `path` by its file name. `None` means neither grammar applies.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;

        if let Some(caps) = WHEEL.captures(file_name) {
            return Some(Self {
                package_name: caps["name"].to_string(),
                interpreter_tag: Some(caps["tag"].to_ascii_lowercase()),
                version: VersionKey::parse(&caps["version"]),
                file_path: path.to_path_buf(),
            });
        }

        SDIST.captures(file_name).map(|caps| Self {
            package_name: caps["name"].to_string(),
            interpreter_tag: None,
            version: VersionKey::parse(&caps["version"]),
            file_path: path.to_path_buf(),
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        if self.interpreter_tag.is_some() {
            ArtifactKind::Binary
        } else {
            ArtifactKind::Source
        }
    }

    pub fn group_key(&self) -> GroupKey {
        let name = normalize_package_name(&self.package_name);
        match &self.interpreter_tag {
            Some(tag) => GroupKey::Binary {
                name,
                tag: tag.clone(),
            },
            None => GroupKey::Source { name },
        }
    }

    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
