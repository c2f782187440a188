//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use mirror_warden::core::config::Config;
use mirror_warden::integrity::baseline::{IntegrityOptions, build_baseline};
use mirror_warden::integrity::verify::{VerifyReport, verify};
use mirror_warden::inventory::ado;
use mirror_warden::logger::jsonl::{JsonlConfig, Severity};
use mirror_warden::logger::sink::{AuditEvent, AuditSink, JsonlSink};
use mirror_warden::mirror::client::{self, ClientOptions, DEFAULT_FREEZE_FILE};
use mirror_warden::mirror::download::{DownloadOptions, DownloadReport, download_all};
use mirror_warden::mirror::requirements::{missing_packages_in_files, requirement_lines};
use mirror_warden::retention::engine::{self, RetentionOptions, RetentionReport};

/// Mirror Warden: integrity baselines and version retention for offline package mirrors.
#[derive(Debug, Parser)]
#[command(
    name = "mwarden",
    author,
    version,
    about = "Mirror Warden - offline package mirror maintenance",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Echo every audit event to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Record or check a mirror integrity baseline.
    Integrity(IntegrityArgs),
    /// Delete all but the newest versions of each package artifact group.
    Retention(RetentionArgs),
    /// Populate a mirror by running the package manager per requirement.
    Download(DownloadArgs),
    /// Write the client's installed packages to a requirements file.
    Freeze(FreezeArgs),
    /// Reinstall a requirements file from the local mirror only.
    Install(InstallArgs),
    /// List packages in a new list that the requirements file lacks.
    RequirementsDiff(RequirementsDiffArgs),
    /// Tab-separated inventory of Stata ado packages.
    AdoReport(AdoReportArgs),
    /// Show the config file path or the effective configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum IntegrityMode {
    Baseline,
    Verify,
}

#[derive(Debug, Clone, Args)]
struct IntegrityArgs {
    /// Mirror root directory.
    #[arg(long, value_name = "PATH")]
    root: PathBuf,
    /// Record a new baseline or verify against the stored one.
    #[arg(long, value_enum)]
    mode: IntegrityMode,
    /// Manifest path (defaults to the configured file name inside the root).
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct RetentionArgs {
    /// Directory holding release artifacts (not searched recursively).
    #[arg(long, value_name = "PATH")]
    dir: PathBuf,
    /// Versions to keep per group (defaults to retention.keep).
    #[arg(long, value_name = "N")]
    keep: Option<usize>,
    /// Report what would be deleted without deleting.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args)]
struct DownloadArgs {
    /// Requirements file, one requirement per line.
    #[arg(long, value_name = "FILE")]
    requirements: PathBuf,
    /// Mirror directory to download into.
    #[arg(long, value_name = "DIR")]
    dest: PathBuf,
    /// Worker pool size (defaults to download.workers).
    #[arg(long, value_name = "N")]
    workers: Option<usize>,
    /// Extra attempts per failing requirement (defaults to download.retries).
    #[arg(long, value_name = "N")]
    retries: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct FreezeArgs {
    /// Requirements file to write.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_FREEZE_FILE)]
    output: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct InstallArgs {
    /// Requirements file to install.
    #[arg(long, value_name = "FILE")]
    requirements: PathBuf,
    /// Mirror directory searched instead of a package index.
    #[arg(long, value_name = "DIR")]
    mirror: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct RequirementsDiffArgs {
    /// List of package names to check.
    #[arg(long = "new", value_name = "FILE")]
    new_list: PathBuf,
    /// Existing requirements file.
    #[arg(long, value_name = "FILE")]
    requirements: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct AdoReportArgs {
    /// Shared ado directory to inventory.
    #[arg(long, value_name = "PATH")]
    shared_root: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Print the effective merged configuration instead of its path.
    #[arg(long)]
    show: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// A maintenance operation failed; nothing was completed.
    #[error("{0}")]
    Runtime(String),
    /// Verification found drift between the mirror and its baseline.
    #[error("{0}")]
    Drift(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    ///
    /// Fatal operation errors and drift share exit code 1 so schedulers only
    /// need to test for non-zero.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) | Self::Runtime(_) | Self::Drift(_) => 1,
            Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Integrity(args) => run_integrity(cli, args),
        Command::Retention(args) => run_retention(cli, args),
        Command::Download(args) => run_download(cli, args),
        Command::Freeze(args) => run_freeze(cli, args),
        Command::Install(args) => run_install(cli, args),
        Command::RequirementsDiff(args) => run_requirements_diff(cli, args),
        Command::AdoReport(args) => run_ado_report(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))
}

// ──────────────────── audit sink ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EchoLevel {
    Errors,
    Warnings,
    All,
}

/// Audit sink used by every command: the JSONL activity log plus an optional
/// stderr echo.
struct CliSink {
    jsonl: JsonlSink,
    echo: EchoLevel,
}

impl CliSink {
    fn open(cli: &Cli, config: &Config) -> Self {
        let echo = if cli.quiet {
            EchoLevel::Errors
        } else if cli.verbose {
            EchoLevel::All
        } else {
            EchoLevel::Warnings
        };
        let jsonl = JsonlSink::open(JsonlConfig::at(&config.paths.jsonl_log), config.audit.clone());
        if echo == EchoLevel::All {
            eprintln!(
                "[{}] activity log {} ({})",
                "info".cyan(),
                config.paths.jsonl_log.display(),
                jsonl.state()
            );
        }
        Self { jsonl, echo }
    }
}

impl AuditSink for CliSink {
    fn emit(&mut self, event: AuditEvent) {
        let show = match event.severity {
            Severity::Error => true,
            Severity::Warning => self.echo != EchoLevel::Errors,
            Severity::Info => self.echo == EchoLevel::All,
        };
        if show {
            let tag = match event.severity {
                Severity::Info => "info".cyan(),
                Severity::Warning => "warn".yellow(),
                Severity::Error => "error".red().bold(),
            };
            eprintln!("[{tag}] {}", event.message);
        }
        self.jsonl.emit(event);
    }
}

impl Drop for CliSink {
    fn drop(&mut self) {
        self.jsonl.flush();
    }
}

// ──────────────────── integrity ────────────────────

fn run_integrity(cli: &Cli, args: &IntegrityArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let options = IntegrityOptions::from(&config.integrity);
    let manifest_path = args
        .manifest
        .clone()
        .unwrap_or_else(|| options.default_manifest_path(&args.root));
    let mut sink = CliSink::open(cli, &config);

    match args.mode {
        IntegrityMode::Baseline => {
            let manifest = build_baseline(&args.root, &manifest_path, &options, &mut sink)
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            match output_mode(cli) {
                OutputMode::Human => {
                    println!(
                        "{} {} files under {}",
                        "Baseline recorded:".green().bold(),
                        manifest.file_count(),
                        manifest.root_path.display()
                    );
                    println!("  Manifest: {}", manifest_path.display());
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "integrity",
                        "mode": "baseline",
                        "root": manifest.root_path.to_string_lossy(),
                        "manifest": manifest_path.to_string_lossy(),
                        "file_count": manifest.file_count(),
                        "generated_at_utc": manifest.generated_at_utc.to_rfc3339(),
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        IntegrityMode::Verify => {
            let report = verify(&args.root, &manifest_path, &options, &mut sink)
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            match output_mode(cli) {
                OutputMode::Human => print_verify_report(&report),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "integrity",
                        "mode": "verify",
                        "report": serde_json::to_value(&report)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            if report.success {
                Ok(())
            } else {
                Err(CliError::Drift(format!(
                    "{} discrepancies between {} and its baseline",
                    report.issues.len(),
                    report.root_path.display()
                )))
            }
        }
    }
}

fn print_verify_report(report: &VerifyReport) {
    if report.success {
        println!(
            "{} {} files match the baseline.",
            "Verified:".green().bold(),
            report.checked_files
        );
        return;
    }
    println!(
        "{} {} issues in {}",
        "Drift detected:".red().bold(),
        report.issues.len(),
        report.root_path.display()
    );
    for issue in &report.issues {
        match &issue.relative_path {
            Some(rel) => println!("  {:<22} {rel}", issue.kind.to_string().yellow()),
            None => println!("  {:<22} {}", issue.kind.to_string().yellow(), issue.detail),
        }
    }
}

// ──────────────────── retention ────────────────────

fn run_retention(cli: &Cli, args: &RetentionArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let mut options = RetentionOptions::from(&config.retention);
    if let Some(keep) = args.keep {
        if keep == 0 {
            return Err(CliError::User("--keep must be at least 1".to_string()));
        }
        options.keep = keep;
    }
    options.dry_run |= args.dry_run;

    let mut sink = CliSink::open(cli, &config);
    let report = engine::run(&args.dir, options, &mut sink)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => print_retention_report(&report),
        OutputMode::Json => {
            let failures: Vec<Value> = report
                .failures
                .iter()
                .map(|f| {
                    json!({
                        "path": f.path.to_string_lossy(),
                        "error": f.error,
                        "error_code": f.error_code,
                    })
                })
                .collect();
            let payload = json!({
                "command": "retention",
                "dir": args.dir.to_string_lossy(),
                "keep": options.keep,
                "dry_run": report.dry_run,
                "groups": report.groups_examined,
                "groups_pruned": report.groups_pruned,
                "kept": report.kept,
                "deleted": report.deleted.iter().map(|p| p.to_string_lossy()).collect::<Vec<_>>(),
                "bytes_freed": report.bytes_freed,
                "unmatched": report.unmatched,
                "failures": failures,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_retention_report(report: &RetentionReport) {
    let verb = if report.dry_run { "Would delete" } else { "Deleted" };
    for path in &report.deleted {
        println!("  {verb} {}", path.display());
    }
    println!(
        "{} {} groups, {} kept, {} {} ({}), {} unmatched files left alone",
        (if report.dry_run { "Dry run:" } else { "Retention complete:" }).bold(),
        report.groups_examined,
        report.kept,
        report.deleted.len(),
        verb.to_lowercase(),
        format_bytes(report.bytes_freed),
        report.unmatched
    );
    for failure in &report.failures {
        eprintln!("  {} {}: {}", "failed".red(), failure.path.display(), failure.error);
    }
}

// ──────────────────── download ────────────────────

fn run_download(cli: &Cli, args: &DownloadArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let mut options = DownloadOptions::from(&config.download);
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(CliError::User("--workers must be at least 1".to_string()));
        }
        options.workers = workers;
    }
    if let Some(retries) = args.retries {
        options.retries = retries;
    }

    let text = fs::read_to_string(&args.requirements).map_err(|e| {
        CliError::Runtime(format!(
            "cannot read requirements {}: {e}",
            args.requirements.display()
        ))
    })?;
    let requirements = requirement_lines(&text);

    let mut sink = CliSink::open(cli, &config);
    let report = download_all(&requirements, &args.dest, &options, &mut sink)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => print_download_report(&report),
        OutputMode::Json => {
            let failed: Vec<Value> = report
                .failed
                .iter()
                .map(|f| {
                    json!({
                        "requirement": f.requirement,
                        "attempts": f.attempts,
                        "error": f.error,
                    })
                })
                .collect();
            let payload = json!({
                "command": "download",
                "dest": report.destination.to_string_lossy(),
                "succeeded": report.succeeded,
                "failed": failed,
                "retries": report.retries,
            });
            write_json_line(&payload)?;
        }
    }

    if report.is_complete() {
        Ok(())
    } else {
        Err(CliError::Partial(format!(
            "{} of {} requirements failed to download",
            report.failed.len(),
            requirements.len()
        )))
    }
}

fn print_download_report(report: &DownloadReport) {
    println!(
        "{} {} downloaded, {} failed, {} retries into {}",
        "Download complete:".bold(),
        report.succeeded.len(),
        report.failed.len(),
        report.retries,
        report.destination.display()
    );
    for failure in &report.failed {
        eprintln!(
            "  {} {} after {} attempts: {}",
            "failed".red(),
            failure.requirement,
            failure.attempts,
            failure.error
        );
    }
}

// ──────────────────── client freeze / install ────────────────────

fn run_freeze(cli: &Cli, args: &FreezeArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let options = ClientOptions::from(&config.client);
    let mut sink = CliSink::open(cli, &config);
    let report = client::freeze(&args.output, &options, &mut sink)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => println!(
            "{} {} packages written to {}",
            "Freeze complete:".bold(),
            report.packages,
            report.output.display()
        ),
        OutputMode::Json => write_json_line(&json!({
            "command": "freeze",
            "output": report.output.to_string_lossy(),
            "packages": report.packages,
        }))?,
    }
    Ok(())
}

fn run_install(cli: &Cli, args: &InstallArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let options = ClientOptions::from(&config.client);
    let mut sink = CliSink::open(cli, &config);
    let report = client::install(&args.requirements, &args.mirror, &options, &mut sink)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => println!(
            "{} {} requirements reinstalled from {}",
            "Install complete:".bold(),
            report.packages,
            report.mirror.display()
        ),
        OutputMode::Json => write_json_line(&json!({
            "command": "install",
            "requirements": report.requirements.to_string_lossy(),
            "mirror": report.mirror.to_string_lossy(),
            "packages": report.packages,
        }))?,
    }
    Ok(())
}

// ──────────────────── requirement diff ────────────────────

fn run_requirements_diff(cli: &Cli, args: &RequirementsDiffArgs) -> Result<(), CliError> {
    let missing = missing_packages_in_files(&args.new_list, &args.requirements)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => {
            if missing.is_empty() {
                println!("No new packages detected.");
            } else {
                println!("New packages not present in requirements:");
                for name in &missing {
                    println!("- {name}");
                }
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "requirements-diff",
                "missing": missing,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── ado report ────────────────────

fn run_ado_report(cli: &Cli, args: &AdoReportArgs) -> Result<(), CliError> {
    let packages =
        ado::inventory(&args.shared_root).map_err(|e| CliError::Runtime(e.to_string()))?;

    // The report is meant to be redirected into a file, so TSV stays the
    // default even when stdout is not a terminal.
    let mut stdout = io::stdout().lock();
    if cli.json {
        let rows: Vec<Value> = packages
            .iter()
            .map(|p| {
                json!({
                    "package": p.package,
                    "version": p.version,
                    "source": ado::SOURCE_LABEL,
                    "description": p.description,
                    "location": p.location.to_string_lossy(),
                    "hash": p.hash,
                })
            })
            .collect();
        serde_json::to_writer(&mut stdout, &json!({"command": "ado-report", "packages": rows}))?;
        writeln!(stdout)?;
    } else {
        for package in &packages {
            writeln!(stdout, "{}", package.to_tsv_row())?;
        }
    }
    Ok(())
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    if !args.show {
        let path = cli.config.clone().unwrap_or_else(Config::default_path);
        let exists = path.exists();
        match output_mode(cli) {
            OutputMode::Human => {
                println!("{}", path.display());
                if !exists {
                    println!("  (file does not exist; defaults will be used)");
                }
            }
            OutputMode::Json => {
                let payload = json!({
                    "command": "config path",
                    "path": path.to_string_lossy(),
                    "exists": exists,
                });
                write_json_line(&payload)?;
            }
        }
        return Ok(());
    }

    let config = load_config(cli)?;
    match output_mode(cli) {
        OutputMode::Human => {
            let toml_str = config
                .to_toml()
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            println!("{toml_str}");
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "config show",
                "config": serde_json::to_value(&config)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── output helpers ────────────────────

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;

    if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("MW_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
