//! Shared path manipulation utilities.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return strip_verbatim(canonical);
    }

    // The file may not exist yet (a manifest about to be written), but its
    // parent usually does; canonicalize that so both sides of a containment
    // check resolve symlinks the same way.
    if let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name())
        && let Ok(canonical_parent) = std::fs::canonicalize(parent)
    {
        return strip_verbatim(canonical_parent).join(name);
    }

    normalize_syntactic(&absolute)
}

/// Whether `candidate` lies strictly inside `root` once both are resolved.
pub fn is_within(candidate: &Path, root: &Path) -> bool {
    let candidate = path_key(&resolve_absolute_path(candidate));
    let root = path_key(&resolve_absolute_path(root));
    candidate != root && candidate.starts_with(&root)
}

/// Whether two paths name the same location once resolved.
///
/// Comparison is case-insensitive on Windows.
pub fn same_location(a: &Path, b: &Path) -> bool {
    path_key(&resolve_absolute_path(a)) == path_key(&resolve_absolute_path(b))
}

/// Relative path of `path` under `root`, joined with `/` regardless of platform.
///
/// Returns `None` when `path` is not under `root`.
pub fn slash_relative(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Key for comparing already-resolved paths without touching the filesystem.
///
/// Case-folded on Windows.
pub fn path_key(path: &Path) -> PathBuf {
    let trimmed = normalize_syntactic(path);
    if cfg!(windows) {
        PathBuf::from(trimmed.to_string_lossy().to_lowercase())
    } else {
        trimmed
    }
}

/// `fs::canonicalize` on Windows yields `\\?\C:\...`; manifests record plain
/// drive paths.
fn strip_verbatim(path: PathBuf) -> PathBuf {
    let raw = path.to_string_lossy();
    raw.strip_prefix(r"\\?\")
        .filter(|rest| !rest.starts_with("UNC"))
        .map_or(path.clone(), PathBuf::from)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
