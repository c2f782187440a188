//! Client-side package manager operations: export the installed set as a
//! requirements file, and reinstall a requirements file from the local mirror
//! only.
//!
//! Both shell out to the configured package manager with absolute paths and
//! never change the working directory.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::ClientConfig;
use crate::core::errors::{MwError, Result};
use crate::core::paths::resolve_absolute_path;
use crate::logger::jsonl::EventType;
use crate::logger::sink::{AuditEvent, AuditSink};
use crate::mirror::download::{capture_package_manager, run_package_manager};
use crate::mirror::requirements::requirement_lines;

/// Placeholder replaced by the absolute mirror directory.
pub const MIRROR_PLACEHOLDER: &str = "{mirror}";
/// Placeholder replaced by the absolute requirements file.
pub const REQUIREMENTS_PLACEHOLDER: &str = "{requirements}";
/// Output file name used when none is given.
pub const DEFAULT_FREEZE_FILE: &str = "python_requirements.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub program: String,
    pub freeze_args: Vec<String>,
    pub install_args: Vec<String>,
    pub removed_env: Vec<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for ClientOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            program: config.program.clone(),
            freeze_args: config.freeze_args.clone(),
            install_args: config.install_args.clone(),
            removed_env: config.removed_env.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezeReport {
    pub output: PathBuf,
    /// Requirement lines written.
    pub packages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub requirements: PathBuf,
    pub mirror: PathBuf,
    /// Requirement lines handed to the package manager.
    pub packages: usize,
}

/// Expand `{mirror}` and `{requirements}` in every template argument.
pub fn expand_install_args(template: &[String], mirror: &Path, requirements: &Path) -> Vec<String> {
    let mirror = mirror.to_string_lossy();
    let requirements = requirements.to_string_lossy();
    template
        .iter()
        .map(|arg| {
            arg.replace(MIRROR_PLACEHOLDER, &mirror)
                .replace(REQUIREMENTS_PLACEHOLDER, &requirements)
        })
        .collect()
}

/// Write the package manager's freeze listing to `output`, creating parent
/// directories. An existing file is replaced.
pub fn freeze(output: &Path, options: &ClientOptions, sink: &mut dyn AuditSink) -> Result<FreezeReport> {
    let output = resolve_absolute_path(output);
    sink.emit(AuditEvent::info(EventType::RunStart, "freeze started").with_path(&output));

    let result = write_freeze(&output, options);
    match &result {
        Ok(report) => sink.emit(
            AuditEvent::info(
                EventType::RunSummary,
                format!("freeze wrote {} packages", report.packages),
            )
            .with_path(&output),
        ),
        Err(err) => sink.emit(
            AuditEvent::error(EventType::Error, format!("freeze failed: {err}"))
                .with_code(err.code()),
        ),
    }
    result
}

fn write_freeze(output: &Path, options: &ClientOptions) -> Result<FreezeReport> {
    let listing = capture_package_manager(&options.program, &options.freeze_args, &options.removed_env)?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|source| MwError::io(parent, source))?;
    }
    fs::write(output, &listing).map_err(|source| MwError::io(output, source))?;
    Ok(FreezeReport {
        output: output.to_path_buf(),
        packages: requirement_lines(&listing).len(),
    })
}

/// Reinstall every requirement from `mirror` without consulting an index.
///
/// Both paths must exist; they are passed to the package manager as absolute
/// paths.
pub fn install(
    requirements: &Path,
    mirror: &Path,
    options: &ClientOptions,
    sink: &mut dyn AuditSink,
) -> Result<InstallReport> {
    let requirements = resolve_absolute_path(requirements);
    let mirror = resolve_absolute_path(mirror);
    sink.emit(
        AuditEvent::info(
            EventType::RunStart,
            format!("install started from {}", mirror.display()),
        )
        .with_path(&requirements),
    );

    let result = run_install(&requirements, &mirror, options);
    match &result {
        Ok(report) => sink.emit(AuditEvent::info(
            EventType::RunSummary,
            format!(
                "install completed: {} requirements from {}",
                report.packages,
                mirror.display()
            ),
        )),
        Err(err) => sink.emit(
            AuditEvent::error(EventType::Error, format!("install failed: {err}"))
                .with_code(err.code()),
        ),
    }
    result
}

fn run_install(requirements: &Path, mirror: &Path, options: &ClientOptions) -> Result<InstallReport> {
    let listing =
        fs::read_to_string(requirements).map_err(|source| MwError::io(requirements, source))?;
    if !mirror.is_dir() {
        return Err(MwError::io(
            mirror,
            std::io::Error::new(std::io::ErrorKind::NotFound, "mirror directory not found"),
        ));
    }

    let args = expand_install_args(&options.install_args, mirror, requirements);
    run_package_manager(&options.program, &args, &options.removed_env)?;
    Ok(InstallReport {
        requirements: requirements.to_path_buf(),
        mirror: mirror.to_path_buf(),
        packages: requirement_lines(&listing).len(),
    })
}
