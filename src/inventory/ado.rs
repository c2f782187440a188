//! Stata ado inventory: one tab-separated row per `.ado` package in a shared tree.
//!
//! Columns follow the compliance inventory layout shared with the pip and
//! CRAN reports: `package, version, source, reviewer, installer, description,
//! url, location, ssc_found, ssc_url, hash`. Hashes come from the tree's
//! integrity baseline when one exists.

#![allow(missing_docs)]

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::core::errors::{MwError, Result};
use crate::core::paths::{resolve_absolute_path, slash_relative};
use crate::integrity::manifest::HashIndex;
use crate::integrity::scanner::{ScanOptions, walk_files};

/// Header lines inspected for metadata.
pub const HEADER_LINE_LIMIT: usize = 30;
pub const SOURCE_LABEL: &str = "Stata";
/// Manifest file name looked up in the shared root.
pub const BASELINE_FILE_NAME: &str = "integrity-baseline.json";

/// Metadata pulled from an ado file header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdoMetadata {
    pub version: Option<String>,
    pub description: Option<String>,
}

/// One inventory row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdoPackage {
    pub package: String,
    pub version: String,
    pub description: String,
    pub location: PathBuf,
    pub hash: String,
}

impl AdoPackage {
    /// Tab-separated row; embedded tabs become spaces.
    pub fn to_tsv_row(&self) -> String {
        let location = self.location.to_string_lossy();
        let columns: [&str; 11] = [
            &self.package,
            &self.version,
            SOURCE_LABEL,
            "Reviewer",
            "Installer",
            &self.description,
            "",
            &location,
            "",
            "",
            &self.hash,
        ];
        columns
            .iter()
            .map(|field| field.replace('\t', " "))
            .collect::<Vec<_>>()
            .join("\t")
    }
}

/// Read the first lines of an ado file as latin-1 and extract its metadata.
///
/// The description is the first non-empty `*` comment; the version is the
/// token after `version` on the first non-comment line that has one.
pub fn read_metadata(path: &Path) -> Result<AdoMetadata> {
    let file = File::open(path).map_err(|source| MwError::io(path, source))?;
    let mut reader = BufReader::new(file);
    let mut lines = Vec::with_capacity(HEADER_LINE_LIMIT);
    let mut buf = Vec::new();
    while lines.len() < HEADER_LINE_LIMIT {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| MwError::io(path, source))?;
        if n == 0 {
            break;
        }
        lines.push(buf.iter().map(|&b| char::from(b)).collect::<String>());
    }
    Ok(parse_header(lines.iter().map(String::as_str)))
}

/// Metadata from already-decoded header lines.
pub fn parse_header<'a>(lines: impl IntoIterator<Item = &'a str>) -> AdoMetadata {
    let mut meta = AdoMetadata::default();
    for line in lines {
        let stripped = line.trim();
        let is_comment = stripped.starts_with('*');

        if is_comment && meta.description.is_none() {
            let text = stripped.trim_start_matches('*').trim();
            if !text.is_empty() {
                meta.description = Some(text.to_string());
            }
        }

        if !is_comment && meta.version.is_none() {
            let lower = stripped.to_lowercase();
            let mut tokens = lower.split_whitespace();
            while let Some(token) = tokens.next() {
                if token == "version" {
                    if let Some(value) = tokens.next() {
                        meta.version = Some(value.to_string());
                    }
                    break;
                }
            }
        }

        if meta.version.is_some() && meta.description.is_some() {
            break;
        }
    }
    meta
}

/// Inventory every `.ado` file under `shared_root`, sorted by path.
pub fn inventory(shared_root: &Path) -> Result<Vec<AdoPackage>> {
    let root = resolve_absolute_path(shared_root);
    if !root.is_dir() {
        return Err(MwError::io(
            &root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "shared ado directory not found"),
        ));
    }

    let hashes = HashIndex::load_or_empty(&root.join(BASELINE_FILE_NAME));
    let hash_root = hashes
        .root()
        .map_or_else(|| root.clone(), resolve_absolute_path);

    let mut packages = Vec::new();
    for path in walk_files(&root, &ScanOptions::default())? {
        let is_ado = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ado"));
        if !is_ado {
            continue;
        }

        // Unreadable files still get a row, just without metadata.
        let meta = read_metadata(&path).unwrap_or_default();
        let relative = slash_relative(&path, &hash_root).unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        packages.push(AdoPackage {
            package: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            version: meta.version.unwrap_or_default(),
            description: meta.description.unwrap_or_default(),
            location: path.parent().map_or_else(|| root.clone(), Path::to_path_buf),
            hash: hashes.get(&relative).unwrap_or_default().to_string(),
        });
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::baseline::{IntegrityOptions, build_baseline};
    use crate::logger::sink::NullSink;
    use std::fs;

    #[test]
    fn header_parsing_picks_first_comment_and_version() {
        let meta = parse_header([
            "*",
            "*! estout 3.31 28may2022 Ben Jann",
            "* second comment",
            "program define estout, rclass",
            "    version 8.2",
            "    version 9",
        ]);
        assert_eq!(meta.description.as_deref(), Some("! estout 3.31 28may2022 Ben Jann"));
        assert_eq!(meta.version.as_deref(), Some("8.2"));
    }

    #[test]
    fn version_in_comment_is_ignored() {
        let meta = parse_header(["* version 1.0 notes", "program x"]);
        assert!(meta.version.is_none());
        assert_eq!(meta.description.as_deref(), Some("version 1.0 notes"));
    }

    #[test]
    fn metadata_beyond_line_limit_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.ado");
        let mut body = "\n".repeat(HEADER_LINE_LIMIT);
        body.push_str("*! too late\nversion 15\n");
        fs::write(&path, body).unwrap();
        assert_eq!(read_metadata(&path).unwrap(), AdoMetadata::default());
    }

    #[test]
    fn latin1_bytes_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("umlaut.ado");
        fs::write(&path, b"*! M\xfcller's tool\r\nversion 14\r\n").unwrap();
        let meta = read_metadata(&path).unwrap();
        assert_eq!(meta.description.as_deref(), Some("! Müller's tool"));
        assert_eq!(meta.version.as_deref(), Some("14"));
    }

    #[test]
    fn row_has_eleven_columns_without_embedded_tabs() {
        let row = AdoPackage {
            package: "estout".to_string(),
            version: "8.2".to_string(),
            description: "tables\tand more".to_string(),
            location: PathBuf::from("/ado/e"),
            hash: String::new(),
        }
        .to_tsv_row();
        let columns: Vec<&str> = row.split('\t').collect();
        assert_eq!(columns.len(), 11);
        assert_eq!(columns[2], "Stata");
        assert_eq!(columns[3], "Reviewer");
        assert_eq!(columns[5], "tables and more");
        assert_eq!(columns[7], "/ado/e");
    }

    #[test]
    fn inventory_joins_baseline_hashes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("e")).unwrap();
        fs::create_dir_all(dir.path().join("r")).unwrap();
        fs::write(dir.path().join("e/estout.ado"), "*! estout\nversion 8.2\n").unwrap();
        fs::write(dir.path().join("e/estout.sthlp"), "help").unwrap();
        let options = IntegrityOptions::default();
        build_baseline(
            dir.path(),
            &options.default_manifest_path(dir.path()),
            &options,
            &mut NullSink,
        )
        .unwrap();
        // Added after the baseline, so it has no recorded hash.
        fs::write(dir.path().join("r/reghdfe.ado"), "*! reghdfe\n").unwrap();

        let packages = inventory(dir.path()).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].package, "estout");
        assert_eq!(packages[0].version, "8.2");
        assert_eq!(packages[0].hash.len(), 64);
        assert_eq!(packages[1].package, "reghdfe");
        assert!(packages[1].hash.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inventory(&dir.path().join("shared_ado")).is_err());
    }
}
