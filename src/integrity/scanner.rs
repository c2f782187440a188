//! Sequential mirror scanner: walks a tree and records size, mtime and content
//! hash for every regular file.
//!
//! Safety invariants:
//! - Symlinks are neither followed nor recorded
//! - Excluded paths are skipped together with their whole subtree
//! - Any unreadable directory or file aborts the scan; a partial baseline is
//!   never produced
//! - A path that is not valid UTF-8 aborts the scan (MW-3003)

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::core::errors::{MwError, Result};
use crate::core::paths::{path_key, resolve_absolute_path, slash_relative};
use crate::integrity::hasher::hash_file;

/// Identity of one mirror file at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path under the scan root, `/`-separated. Unique within a scan.
    pub relative_path: String,
    pub full_path: PathBuf,
    pub size_bytes: u64,
    pub last_modified_utc: DateTime<Utc>,
    /// Lowercase hex SHA-256.
    pub content_hash: String,
}

/// What to leave out of a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Absolute paths; directories exclude their subtree.
    pub excluded_paths: Vec<PathBuf>,
    /// Lowercase extensions without the dot.
    pub excluded_extensions: Vec<String>,
}

impl ScanOptions {
    fn compile(&self) -> CompiledExclusions {
        CompiledExclusions {
            paths: self
                .excluded_paths
                .iter()
                .map(|p| path_key(&resolve_absolute_path(p)))
                .collect(),
            extensions: self
                .excluded_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

struct CompiledExclusions {
    paths: HashSet<PathBuf>,
    extensions: HashSet<String>,
}

impl CompiledExclusions {
    fn excludes_path(&self, path: &Path) -> bool {
        !self.paths.is_empty() && self.paths.contains(&path_key(path))
    }

    fn excludes_extension(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.contains(&ext.to_string_lossy().to_ascii_lowercase()))
    }
}

/// Every regular file under `root` that survives the exclusions, sorted by path.
///
/// `root` is resolved first, so returned paths are absolute.
pub fn walk_files(root: &Path, options: &ScanOptions) -> Result<Vec<PathBuf>> {
    let root = resolve_absolute_path(root);
    let meta = fs::metadata(&root).map_err(|source| MwError::io(&root, source))?;
    if !meta.is_dir() {
        return Err(MwError::io(
            &root,
            std::io::Error::new(std::io::ErrorKind::NotADirectory, "scan root is not a directory"),
        ));
    }

    let exclusions = options.compile();
    let mut files = Vec::new();
    let mut pending = vec![root];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| MwError::io(&dir, source))?;
        for entry in entries {
            let entry = entry.map_err(|source| MwError::io(&dir, source))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|source| MwError::io(&path, source))?;

            if file_type.is_symlink() || exclusions.excludes_path(&path) {
                continue;
            }
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && !exclusions.excludes_extension(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Scan `root` and hash every included file.
pub fn scan_tree(root: &Path, options: &ScanOptions) -> Result<Vec<FileRecord>> {
    let root = resolve_absolute_path(root);
    if root.to_str().is_none() {
        return Err(MwError::NonUtf8Path { path: root });
    }
    let files = walk_files(&root, options)?;
    hash_listed(&root, files)
}

/// Record every listed file. The first failure discards all records.
fn hash_listed(root: &Path, files: Vec<PathBuf>) -> Result<Vec<FileRecord>> {
    let mut records = Vec::with_capacity(files.len());
    for path in files {
        records.push(record_for(root, path)?);
    }
    records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(records)
}

fn record_for(root: &Path, path: PathBuf) -> Result<FileRecord> {
    if path.to_str().is_none() {
        return Err(MwError::NonUtf8Path { path });
    }
    let meta = fs::metadata(&path).map_err(|source| MwError::io(&path, source))?;
    let modified = meta
        .modified()
        .map_err(|source| MwError::io(&path, source))?;
    let relative_path = slash_relative(&path, root).ok_or_else(|| MwError::Runtime {
        details: format!("{} escaped scan root {}", path.display(), root.display()),
    })?;
    let content_hash = hash_file(&path)?;

    Ok(FileRecord {
        relative_path,
        size_bytes: meta.len(),
        last_modified_utc: DateTime::<Utc>::from(modified),
        content_hash,
        full_path: path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn records_are_sorted_with_slash_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.whl", b"b");
        write(dir.path(), "sub/a.tar.gz", b"a");
        write(dir.path(), "a.zip", b"z");

        let records = scan_tree(dir.path(), &ScanOptions::default()).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.relative_path.as_str()).collect();
        assert_eq!(names, vec!["a.zip", "b.whl", "sub/a.tar.gz"]);
        assert_eq!(records[0].size_bytes, 1);
        assert_eq!(records[0].content_hash.len(), 64);
        assert!(records[2].full_path.is_absolute());
    }

    #[test]
    fn extension_exclusions_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.whl", b"k");
        write(dir.path(), "download.TMP", b"t");
        write(dir.path(), "run.log", b"l");

        let options = ScanOptions {
            excluded_paths: Vec::new(),
            excluded_extensions: vec!["tmp".to_string(), "log".to_string()],
        };
        let records = scan_tree(dir.path(), &options).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].relative_path, "keep.whl");
    }

    #[test]
    fn excluded_directory_skips_subtree() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep/a.whl", b"a");
        write(dir.path(), "staging/b.whl", b"b");
        write(dir.path(), "staging/deep/c.whl", b"c");

        let options = ScanOptions {
            excluded_paths: vec![dir.path().join("staging")],
            excluded_extensions: Vec::new(),
        };
        let records = scan_tree(dir.path(), &options).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].relative_path, "keep/a.whl");
    }

    #[test]
    fn excluded_file_path_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "integrity-baseline.json", b"{}");
        write(dir.path(), "a.whl", b"a");

        let options = ScanOptions {
            excluded_paths: vec![dir.path().join("integrity-baseline.json")],
            excluded_extensions: Vec::new(),
        };
        let records = scan_tree(dir.path(), &options).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_root_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_tree(&dir.path().join("absent"), &ScanOptions::default()).unwrap_err();
        assert_eq!(err.code(), "MW-3002");
    }

    #[test]
    fn file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.whl", b"a");
        assert!(scan_tree(&dir.path().join("a.whl"), &ScanOptions::default()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "real.whl", b"r");
        std::os::unix::fs::symlink(dir.path().join("real.whl"), dir.path().join("link.whl"))
            .unwrap();

        let records = scan_tree(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].relative_path, "real.whl");
    }

    #[test]
    fn file_vanishing_before_hashing_aborts_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.whl", b"a");
        write(dir.path(), "b.whl", b"b");
        write(dir.path(), "c.whl", b"c");
        let root = resolve_absolute_path(dir.path());
        let listed = walk_files(&root, &ScanOptions::default()).unwrap();
        assert_eq!(listed.len(), 3);

        fs::remove_file(root.join("b.whl")).unwrap();

        let result = hash_listed(&root, listed);
        match result {
            Err(MwError::Io { path, .. }) => assert!(path.ends_with("b.whl")),
            other => panic!("expected an IO error for b.whl, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_aborts_scan() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.whl", b"a");
        write(dir.path(), "locked.whl", b"secret");
        let locked = dir.path().join("locked.whl");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Permission bits do not bind root.
        if fs::File::open(&locked).is_ok() {
            return;
        }

        let err = scan_tree(dir.path(), &ScanOptions::default()).unwrap_err();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(err, MwError::Io { .. }), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_file_name_aborts_scan_with_its_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.whl", b"ok");
        let odd = dir.path().join(OsStr::from_bytes(b"caf\xe9.tar.gz"));
        if fs::write(&odd, b"x").is_err() {
            // Some filesystems refuse non-UTF-8 names outright.
            return;
        }

        let err = scan_tree(dir.path(), &ScanOptions::default()).unwrap_err();
        assert_eq!(err.code(), "MW-3003");
        match err {
            MwError::NonUtf8Path { path } => assert_eq!(path.file_name(), odd.file_name()),
            other => panic!("expected a non-UTF-8 path error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn distinct_non_utf8_names_never_collapse_into_one_record() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let first = fs::write(dir.path().join(OsStr::from_bytes(b"a\xfe")), b"1");
        let second = fs::write(dir.path().join(OsStr::from_bytes(b"a\xff")), b"2");
        if first.is_err() || second.is_err() {
            return;
        }

        let err = scan_tree(dir.path(), &ScanOptions::default()).unwrap_err();
        assert_eq!(err.code(), "MW-3003");
    }

    #[test]
    fn walk_files_lists_without_hashing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ado/a/alpha.ado", b"*! alpha");
        write(dir.path(), "ado/b/beta.ado", b"*! beta");
        let files = walk_files(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("alpha.ado"));
    }
}
