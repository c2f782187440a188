#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
    /// Activity log the run wrote its audit events to.
    pub activity_log: PathBuf,
}

impl CmdResult {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Parsed audit events from the activity log.
    pub fn events(&self) -> Vec<serde_json::Value> {
        fs::read_to_string(&self.activity_log)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_mwarden") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "mwarden.exe" } else { "mwarden" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve mwarden binary path for integration test"),
    }
}

/// Run the binary with human output and an isolated HOME and activity log.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_in(case_name, args, None)
}

/// Like [`run_cli_case`], with an explicit working directory.
pub fn run_cli_case_in(case_name: &str, args: &[&str], cwd: Option<&Path>) -> CmdResult {
    let root = std::env::temp_dir().join("mwarden-test-logs");
    let case_dir = root.join(format!("{}-{}", sanitize(case_name), now_millis()));
    let home = case_dir.join("home");
    fs::create_dir_all(&home).expect("create temp test home");

    let log_path = case_dir.join("case.log");
    let activity_log = case_dir.join("activity.jsonl");
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("HOME", &home)
        .env("USERPROFILE", &home)
        .env("MW_PATHS_JSONL_LOG", &activity_log)
        .env("MW_OUTPUT_FORMAT", "human")
        .env("RUST_BACKTRACE", "1");
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    let output = command.output().expect("execute mwarden command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
        activity_log,
    }
}

/// Write `content` at `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &[u8]) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(&path, content).expect("write fixture file");
    path
}
