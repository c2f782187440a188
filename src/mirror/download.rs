//! Mirror population: run the package manager once per requirement on a fixed
//! worker pool.
//!
//! Architecture: the caller thread feeds a bounded job queue; `workers` threads
//! pull jobs, invoke the package manager with retries, and report every
//! attempt on a result channel. The caller collects all outcomes before
//! returning, so failures are always surfaced explicitly.
//!
//! Child processes get absolute paths as arguments and inherit the caller's
//! working directory unchanged.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::core::config::DownloadConfig;
use crate::core::errors::{MwError, Result};
use crate::core::paths::resolve_absolute_path;
use crate::logger::jsonl::EventType;
use crate::logger::sink::{AuditEvent, AuditSink};

/// Placeholder replaced by the requirement line.
pub const REQUIREMENT_PLACEHOLDER: &str = "{requirement}";
/// Placeholder replaced by the absolute destination directory.
pub const DEST_PLACEHOLDER: &str = "{dest}";

const STDERR_TAIL_BYTES: usize = 400;

// ──────────────────── configuration ────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub program: String,
    pub args: Vec<String>,
    pub workers: usize,
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub retry_delay: Duration,
    pub removed_env: Vec<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::from(&DownloadConfig::default())
    }
}

impl From<&DownloadConfig> for DownloadOptions {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            workers: config.workers,
            retries: config.retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            removed_env: config.removed_env.clone(),
        }
    }
}

/// Expand `{requirement}` and `{dest}` in every template argument.
pub fn expand_args(template: &[String], requirement: &str, dest: &Path) -> Vec<String> {
    let dest = dest.to_string_lossy();
    template
        .iter()
        .map(|arg| {
            arg.replace(DEST_PLACEHOLDER, &dest)
                .replace(REQUIREMENT_PLACEHOLDER, requirement)
        })
        .collect()
}

// ──────────────────── report types ────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    pub requirement: String,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub destination: PathBuf,
    /// Requirements in input order.
    pub succeeded: Vec<String>,
    pub failed: Vec<DownloadFailure>,
    pub retries: u32,
}

impl DownloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Job {
    index: usize,
    requirement: String,
}

enum WorkerMessage {
    Retry {
        requirement: String,
        attempt: u32,
        error: String,
    },
    Finished {
        index: usize,
        requirement: String,
        attempts: u32,
        error: Option<String>,
    },
}

// ──────────────────── pool ────────────────────

/// Download every requirement into `dest`.
///
/// Returns an error only when the destination cannot be prepared; per-job
/// failures are collected in the report.
pub fn download_all(
    requirements: &[String],
    dest: &Path,
    options: &DownloadOptions,
    sink: &mut dyn AuditSink,
) -> Result<DownloadReport> {
    fs::create_dir_all(dest).map_err(|source| MwError::io(dest, source))?;
    let dest = resolve_absolute_path(dest);

    sink.emit(
        AuditEvent::info(
            EventType::RunStart,
            format!(
                "download started: {} requirements, {} workers",
                requirements.len(),
                options.workers.max(1)
            ),
        )
        .with_path(&dest),
    );

    let workers = options.workers.max(1).min(requirements.len().max(1));
    let (job_tx, job_rx) = bounded::<Job>(workers * 2);
    let (result_tx, result_rx) = unbounded::<WorkerMessage>();

    let mut outcomes: Vec<(usize, String, u32, Option<String>)> = Vec::with_capacity(requirements.len());
    let mut report = DownloadReport {
        destination: dest.clone(),
        ..DownloadReport::default()
    };

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let dest = dest.as_path();
            scope.spawn(move || worker_thread(&job_rx, &result_tx, dest, options));
        }
        drop(result_tx);
        drop(job_rx);

        for (index, requirement) in requirements.iter().enumerate() {
            let job = Job {
                index,
                requirement: requirement.clone(),
            };
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);

        for message in &result_rx {
            match message {
                WorkerMessage::Retry {
                    requirement,
                    attempt,
                    error,
                } => {
                    report.retries += 1;
                    sink.emit(AuditEvent::warning(
                        EventType::DownloadRetry,
                        format!("retrying {requirement} after attempt {attempt}: {error}"),
                    ));
                }
                WorkerMessage::Finished {
                    index,
                    requirement,
                    attempts,
                    error,
                } => outcomes.push((index, requirement, attempts, error)),
            }
        }
    });

    outcomes.sort_by_key(|(index, ..)| *index);
    for (_, requirement, attempts, error) in outcomes {
        match error {
            None => report.succeeded.push(requirement),
            Some(error) => {
                sink.emit(
                    AuditEvent::error(
                        EventType::DownloadFailed,
                        format!("{requirement} failed after {attempts} attempts: {error}"),
                    )
                    .with_code("MW-3101"),
                );
                report.failed.push(DownloadFailure {
                    requirement,
                    attempts,
                    error,
                });
            }
        }
    }

    let summary = format!(
        "download completed into {}: {} ok, {} failed, {} retries",
        dest.display(),
        report.succeeded.len(),
        report.failed.len(),
        report.retries
    );
    sink.emit(if report.is_complete() {
        AuditEvent::info(EventType::RunSummary, summary)
    } else {
        AuditEvent::warning(EventType::RunSummary, summary)
    });

    Ok(report)
}

fn worker_thread(
    job_rx: &Receiver<Job>,
    result_tx: &Sender<WorkerMessage>,
    dest: &Path,
    options: &DownloadOptions,
) {
    for job in job_rx {
        let args = expand_args(&options.args, &job.requirement, dest);
        let max_attempts = options.retries.saturating_add(1);
        let mut attempt = 0;
        let error = loop {
            attempt += 1;
            match run_package_manager(&options.program, &args, &options.removed_env) {
                Ok(()) => break None,
                Err(err) if attempt < max_attempts => {
                    let _ = result_tx.send(WorkerMessage::Retry {
                        requirement: job.requirement.clone(),
                        attempt,
                        error: err.to_string(),
                    });
                    if !options.retry_delay.is_zero() {
                        thread::sleep(options.retry_delay);
                    }
                }
                Err(err) => break Some(err.to_string()),
            }
        };

        let finished = WorkerMessage::Finished {
            index: job.index,
            requirement: job.requirement,
            attempts: attempt,
            error,
        };
        if result_tx.send(finished).is_err() {
            return;
        }
    }
}

/// Run the package manager once, discarding its stdout.
pub fn run_package_manager(program: &str, args: &[String], removed_env: &[String]) -> Result<()> {
    invoke(program, args, removed_env, Stdio::null()).map(drop)
}

/// Run the package manager once and return its stdout.
pub fn capture_package_manager(program: &str, args: &[String], removed_env: &[String]) -> Result<String> {
    let stdout = invoke(program, args, removed_env, Stdio::piped())?;
    String::from_utf8(stdout).map_err(|err| MwError::Subprocess {
        program: program.to_string(),
        details: format!("output is not UTF-8: {err}"),
    })
}

fn invoke(program: &str, args: &[String], removed_env: &[String], stdout: Stdio) -> Result<Vec<u8>> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::piped());
    for var in removed_env {
        command.env_remove(var);
    }

    let output = command.output().map_err(|err| MwError::Subprocess {
        program: program.to_string(),
        details: format!("failed to start: {err}"),
    })?;
    if output.status.success() {
        return Ok(output.stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let tail_start = stderr
        .char_indices()
        .rev()
        .nth(STDERR_TAIL_BYTES)
        .map_or(0, |(idx, _)| idx);
    Err(MwError::Subprocess {
        program: program.to_string(),
        details: format!(
            "exit {}: {}",
            output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            &stderr[tail_start..]
        ),
    })
}
