//! Requirement-list parsing: download job lines and package-name diffs.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::core::errors::{MwError, Result};

fn strip_comment(raw: &str) -> &str {
    raw.split_once('#').map_or(raw, |(head, _)| head).trim()
}

/// Lines worth handing to the package manager one at a time.
///
/// Blank lines, comments and option lines (`-r`, `--index-url`, ...) are skipped.
pub fn requirement_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_comment)
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .map(str::to_string)
        .collect()
}

/// Normalized package names mentioned in requirement-style text.
///
/// Version specifiers and extras are dropped. Names are lowercased with `_`
/// treated as `-`. Editable lines (`-e pkg`, `--editable=pkg`) contribute
/// their target.
pub fn extract_package_names(text: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for raw in text.lines() {
        let mut line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("--editable") {
            line = rest.trim_start_matches(['=', ' ', '\t']).trim();
        } else if let Some(rest) = line.strip_prefix("-e") {
            line = rest.trim_start_matches(['=', ' ', '\t']).trim();
        } else if line.starts_with('-') {
            continue;
        }

        let base = line
            .split(|c: char| matches!(c, '<' | '>' | '=' | '!' | '~' | ';' | '@') || c.is_whitespace())
            .next()
            .unwrap_or_default();
        let base = base.split('[').next().unwrap_or_default();
        if !base.is_empty() {
            names.insert(base.replace('_', "-").to_lowercase());
        }
    }
    names
}

/// Names listed in `new_list` that `requirements` does not mention.
pub fn missing_packages(new_list: &str, requirements: &str) -> Vec<String> {
    let existing = extract_package_names(requirements);
    extract_package_names(new_list)
        .into_iter()
        .filter(|name| !existing.contains(name))
        .collect()
}

/// File-based form of [`missing_packages`]. A missing requirements file counts
/// as empty; a missing new list is an error.
pub fn missing_packages_in_files(new_path: &Path, requirements_path: &Path) -> Result<Vec<String>> {
    let new_list = fs::read_to_string(new_path).map_err(|source| MwError::io(new_path, source))?;
    let requirements = match fs::read_to_string(requirements_path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => return Err(MwError::io(requirements_path, source)),
    };
    Ok(missing_packages(&new_list, &requirements))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_drop_specifiers_extras_and_comments() {
        let text = "\
# pinned for the lab
numpy==1.26.4
Pandas >= 2.0  # data frames
requests[socks]~=2.31
typing_extensions
-r other.txt
--index-url https://example.invalid/simple

pywin32; sys_platform == 'win32'
";
        let names: Vec<String> = extract_package_names(text).into_iter().collect();
        assert_eq!(
            names,
            vec!["numpy", "pandas", "pywin32", "requests", "typing-extensions"]
        );
    }

    #[test]
    fn editable_lines_contribute_their_target() {
        let names = extract_package_names("-e mylib\n--editable=Other_Lib\n");
        assert!(names.contains("mylib"));
        assert!(names.contains("other-lib"));
    }

    #[test]
    fn diff_is_sorted_and_normalized() {
        let missing = missing_packages("scipy\nNumPy\nnew_pkg\n", "numpy==1.26.4\n");
        assert_eq!(missing, vec!["new-pkg", "scipy"]);
    }

    #[test]
    fn requirement_lines_skip_options_and_blanks() {
        let lines = requirement_lines("numpy==1.26.4\n\n# note\n-r base.txt\nscipy  # sci\n");
        assert_eq!(lines, vec!["numpy==1.26.4", "scipy"]);
    }

    #[test]
    fn missing_requirements_file_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let new_path = dir.path().join("new.txt");
        fs::write(&new_path, "alpha\nbeta\n").unwrap();
        let missing =
            missing_packages_in_files(&new_path, &dir.path().join("python_requirements.txt"))
                .unwrap();
        assert_eq!(missing, vec!["alpha", "beta"]);

        let err = missing_packages_in_files(&dir.path().join("absent.txt"), &new_path).unwrap_err();
        assert_eq!(err.code(), "MW-3002");
    }
}
