//! Manifest store: the on-disk JSON baseline of a mirror.
//!
//! Wire layout (field names match manifests written by the PowerShell tooling):
//!
//! ```json
//! {
//!   "GeneratedAtUtc": "2026-01-01T00:00:00.000Z",
//!   "Mode": "baseline",
//!   "Mirror": {
//!     "RootPath": "C:\\admin\\pip_mirror",
//!     "FileCount": 1,
//!     "Files": [
//!       { "RelativePath": "numpy-1.26.4.tar.gz", "FullPath": "...", "SizeBytes": 10,
//!         "LastWriteTimeUtc": "...", "Hash": "..." }
//!     ]
//!   }
//! }
//! ```
//!
//! Loading tolerates what older writers produced: a UTF-8 BOM, `\`-separated
//! relative paths, uppercase hashes, a single-element `Files` array collapsed
//! to a bare object, and missing optional per-file fields. Everything else that
//! deviates is [`MwError::ManifestCorrupt`].

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::errors::{MwError, Result};
use crate::integrity::hasher::is_sha256_hex;
use crate::integrity::scanner::FileRecord;

/// The only mode a stored manifest can carry.
pub const MODE_BASELINE: &str = "baseline";

/// A recorded baseline of one mirror root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub generated_at_utc: DateTime<Utc>,
    pub root_path: PathBuf,
    /// Sorted by `relative_path`, unique.
    pub files: Vec<FileRecord>,
}

impl Manifest {
    /// Build a manifest, sorting `files` into canonical order.
    pub fn new(generated_at_utc: DateTime<Utc>, root_path: PathBuf, mut files: Vec<FileRecord>) -> Self {
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Self {
            generated_at_utc,
            root_path,
            files,
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

// ──────────────────── wire format ────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestDocument {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    generated_at_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    mirror: Option<MirrorSection>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MirrorSection {
    #[serde(default)]
    root_path: Option<PathBuf>,
    #[serde(default)]
    file_count: Option<usize>,
    #[serde(default)]
    files: Option<FileList>,
}

/// PowerShell's `ConvertTo-Json` unwraps one-element arrays.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum FileList {
    Many(Vec<FileEntry>),
    One(Box<FileEntry>),
}

impl FileList {
    fn into_vec(self) -> Vec<FileEntry> {
        match self {
            Self::Many(entries) => entries,
            Self::One(entry) => vec![*entry],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileEntry {
    #[serde(default)]
    relative_path: Option<String>,
    #[serde(default)]
    full_path: Option<PathBuf>,
    #[serde(default)]
    size_bytes: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        serialize_with = "timestamp_millis"
    )]
    last_write_time_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    hash: Option<String>,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

#[allow(clippy::ref_option)]
fn timestamp_millis<S>(value: &Option<DateTime<Utc>>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => serializer.serialize_none(),
    }
}

impl From<&Manifest> for ManifestDocument {
    fn from(manifest: &Manifest) -> Self {
        let files = manifest
            .files
            .iter()
            .map(|f| FileEntry {
                relative_path: Some(f.relative_path.clone()),
                full_path: Some(f.full_path.clone()),
                size_bytes: Some(f.size_bytes),
                last_write_time_utc: Some(f.last_modified_utc),
                hash: Some(f.content_hash.clone()),
            })
            .collect();
        Self {
            generated_at_utc: Some(manifest.generated_at_utc),
            mode: Some(MODE_BASELINE.to_string()),
            mirror: Some(MirrorSection {
                root_path: Some(manifest.root_path.clone()),
                file_count: Some(manifest.files.len()),
                files: Some(FileList::Many(files)),
            }),
        }
    }
}

// ──────────────────── store ────────────────────

/// Serialize a manifest to its canonical JSON text.
pub fn to_json(manifest: &Manifest) -> Result<String> {
    let mut doc = serde_json::to_value(ManifestDocument::from(manifest))?;
    // Millisecond precision keeps the header stable across serializer versions.
    doc["GeneratedAtUtc"] = serde_json::Value::String(
        manifest
            .generated_at_utc
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Write `manifest` to `path`, replacing any previous manifest atomically.
pub fn save(manifest: &Manifest, path: &Path) -> Result<()> {
    let json = to_json(manifest)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| MwError::io(parent, source))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let write_tmp = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()
    };
    if let Err(source) = write_tmp() {
        let _ = fs::remove_file(&tmp_path);
        return Err(MwError::io(&tmp_path, source));
    }

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        MwError::io(path, source)
    })
}

/// Read and validate a manifest.
pub fn load(path: &Path) -> Result<Manifest> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(MwError::ManifestMissing {
                path: path.to_path_buf(),
            });
        }
        Err(source) => return Err(MwError::io(path, source)),
    };
    parse(&raw, path)
}

/// Parse manifest text; `origin` is only used in error messages.
pub fn parse(raw: &str, origin: &Path) -> Result<Manifest> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let doc: ManifestDocument =
        serde_json::from_str(text).map_err(|e| MwError::corrupt(origin, e.to_string()))?;

    if let Some(mode) = &doc.mode
        && !mode.trim().eq_ignore_ascii_case(MODE_BASELINE)
    {
        return Err(MwError::corrupt(origin, format!("unsupported Mode {mode:?}")));
    }

    let mirror = doc
        .mirror
        .ok_or_else(|| MwError::corrupt(origin, "missing Mirror section"))?;
    let root_path = mirror
        .root_path
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| MwError::corrupt(origin, "missing Mirror.RootPath"))?;

    let entries = match mirror.files {
        Some(list) => list.into_vec(),
        None if mirror.file_count == Some(0) => Vec::new(),
        None => return Err(MwError::corrupt(origin, "missing Mirror.Files")),
    };

    if let Some(declared) = mirror.file_count
        && declared != entries.len()
    {
        return Err(MwError::corrupt(
            origin,
            format!(
                "Mirror.FileCount is {declared} but Mirror.Files has {} entries",
                entries.len()
            ),
        ));
    }

    let mut seen = HashSet::with_capacity(entries.len());
    let mut files = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let relative_path = entry
            .relative_path
            .as_deref()
            .map(normalize_relative)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                MwError::corrupt(origin, format!("Mirror.Files[{index}].RelativePath missing"))
            })?;
        let hash = entry
            .hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MwError::corrupt(origin, format!("Mirror.Files[{index}].Hash missing")))?;
        if !is_sha256_hex(hash) {
            return Err(MwError::corrupt(
                origin,
                format!("Mirror.Files[{index}].Hash is not a SHA-256 hex digest"),
            ));
        }
        if !seen.insert(relative_path.clone()) {
            return Err(MwError::corrupt(
                origin,
                format!("duplicate RelativePath {relative_path:?}"),
            ));
        }

        files.push(FileRecord {
            full_path: entry
                .full_path
                .unwrap_or_else(|| root_path.join(&relative_path)),
            size_bytes: entry.size_bytes.unwrap_or(0),
            last_modified_utc: entry.last_write_time_utc.unwrap_or_default(),
            content_hash: hash.to_ascii_lowercase(),
            relative_path,
        });
    }

    Ok(Manifest::new(
        doc.generated_at_utc.unwrap_or_default(),
        root_path,
        files,
    ))
}

fn normalize_relative(raw: &str) -> String {
    raw.trim()
        .replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// ──────────────────── hash index ────────────────────

/// Case-insensitive relative-path → hash lookup over a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    root: Option<PathBuf>,
    hashes: BTreeMap<String, String>,
}

impl HashIndex {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            root: Some(manifest.root_path.clone()),
            hashes: manifest
                .files
                .iter()
                .map(|f| (f.relative_path.to_lowercase(), f.content_hash.clone()))
                .collect(),
        }
    }

    /// Index of the manifest at `path`, or an empty index if it is missing or
    /// unreadable. Reports treat an absent baseline as "no hash known".
    pub fn load_or_empty(path: &Path) -> Self {
        load(path).map_or_else(|_| Self::default(), |m| Self::from_manifest(&m))
    }

    /// Mirror root recorded in the manifest, if one was loaded.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn get(&self, relative_path: &str) -> Option<&str> {
        self.hashes
            .get(&normalize_relative(relative_path).to_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
