//! Smart Logger CLI
//!
//! Runs a command with its output buffered through smartlog-core. The
//! captured output is only printed when the command's outcome matches a
//! flush trigger, so passing commands stay quiet.
//!
//! ## Usage
//!
//! ```bash
//! # Run a test binary; its output appears only if it fails
//! smartlog run -- cargo test -p checkout
//!
//! # Flush on every outcome and keep a copy of each flush on disk
//! smartlog run --flush-on fail,pass,skip --attach-dir target/smart-logs -- ./e2e.sh
//!
//! # Treat exit code 77 as skipped, kill after 30 seconds
//! smartlog run --skip-code 77 --timeout 30 -- ./flaky-test
//!
//! # Show the effective configuration
//! smartlog config --config smartlog.json
//! ```

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use smartlog_core::{
    args, parse_trigger_list, ConsoleHub, ConsoleMessage, DirectoryAttachments, RunOutcome,
    RunStatus, SmartLog, SmartLogOptions, SmartLogRun, StdoutSink,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Environment variable naming a config file when `--config` is not given
const CONFIG_ENV: &str = "SMARTLOG_CONFIG";

/// Exit code used when the command is killed for running too long
const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long to keep reading output after the command has exited
const READER_GRACE: Duration = Duration::from_secs(1);

/// Smart Logger - quiet unless it matters
#[derive(Parser)]
#[command(name = "smartlog")]
#[command(version = "0.1.0")]
#[command(about = "Smart Logger - quiet unless it matters")]
#[command(
    long_about = "Buffers a command's output and prints it only when the outcome matches a flush trigger (by default: failure or retry)."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command with buffered output
    Run(RunArgs),

    /// Print the effective configuration as JSON
    Config(PolicyArgs),
}

/// Options shared by every command that builds a configuration
#[derive(Args)]
struct PolicyArgs {
    /// JSON config file (default: $SMARTLOG_CONFIG, then ~/.config/smartlog/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated flush triggers: fail,pass,skip,fixme,retry,timeout
    #[arg(long, value_name = "LIST")]
    flush_on: Option<String>,

    /// Maximum number of buffered entries
    #[arg(long, value_name = "N")]
    max_buffer_size: Option<usize>,

    /// Capture the command's stdout/stderr into the buffer (default)
    #[arg(long, conflicts_with = "no_capture")]
    capture_output: bool,

    /// Let the command write straight to the terminal
    #[arg(long)]
    no_capture: bool,

    /// Write each flush to <DIR>/<title>-smart-log-<n>.txt
    #[arg(long, value_name = "DIR")]
    attach_dir: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    policy: PolicyArgs,

    /// Run title used in attachment headers and file names
    #[arg(short, long)]
    title: Option<String>,

    /// Kill the command after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Retry attempt number (0 for the first attempt)
    #[arg(long, default_value_t = 0)]
    retry: u32,

    /// Exit code that marks the command as skipped
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    skip_code: Option<i32>,

    /// Command to run, after `--`
    #[arg(last = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            let code = run_command(args).await?;
            std::process::exit(code);
        }
        Commands::Config(policy) => {
            let options = resolve_options(&policy)?;
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
    }

    Ok(())
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Config file to start from: `--config`, then `$SMARTLOG_CONFIG`, then the
/// user config file if one exists.
fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("smartlog").join("config.json"))
        .filter(|path| path.is_file())
}

/// Layer defaults, the config file and command-line flags.
///
/// Without a config file the wrapper captures the command's output; a config
/// file decides for itself through `captureExternalConsole`.
fn resolve_options(policy: &PolicyArgs) -> Result<SmartLogOptions> {
    let mut options = match config_path(policy.config.as_deref()) {
        Some(path) => SmartLogOptions::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SmartLogOptions::default().with_external_console(true),
    };

    if let Some(list) = &policy.flush_on {
        let triggers = parse_trigger_list(list).context("Invalid --flush-on")?;
        options = options.with_flush_on(triggers);
    }
    if let Some(size) = policy.max_buffer_size {
        options = options.with_max_buffer_size(size);
    }
    if policy.capture_output {
        options = options.with_external_console(true);
    }
    if policy.no_capture {
        options = options.with_external_console(false);
    }
    if policy.attach_dir.is_some() {
        options = options.with_attach_to_report(true);
    }

    options.validate().context("Invalid configuration")?;
    Ok(options)
}

/// Run the wrapped command and return the exit code to finish with.
async fn run_command(args: RunArgs) -> Result<i32> {
    let options = resolve_options(&args.policy)?;
    let (program, program_args) = args
        .command
        .split_first()
        .context("No command given")?;
    let title = args.title.clone().unwrap_or_else(|| args.command.join(" "));
    let capture = options.capture_external_console;

    let hub = ConsoleHub::new();
    let mut builder = SmartLog::builder(&title)
        .options(options.clone())
        .output(StdoutSink::new(std::io::stdout().is_terminal()))
        .external_console(Arc::new(hub.clone()));
    if options.attach_to_report {
        let dir = args
            .policy
            .attach_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("smart-logs"));
        builder = builder.attachments(DirectoryAttachments::new(dir, &title));
    }
    let run = SmartLogRun::begin(builder.build());

    let mut cmd = Command::new(program);
    cmd.args(program_args).kill_on_drop(true);
    if capture {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    }
    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to start {}", program))?;

    run.log().info(args!["Running:", args.command.join(" ")]);

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, hub.clone(), "log"));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, hub.clone(), "error"));
    }

    let waited = match args.timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), child.wait())
            .await
            .ok(),
        None => Some(child.wait().await),
    };

    let (status, code) = match waited {
        Some(exit) => {
            let exit = exit.context("Failed to wait for command")?;
            classify(exit, args.skip_code)
        }
        None => {
            tracing::info!(program = %program, "Command timed out, killing");
            child.kill().await.context("Failed to kill timed-out command")?;
            (RunStatus::TimedOut, TIMEOUT_EXIT_CODE)
        }
    };

    // Pipes close once the child is gone, unless a grandchild still holds them.
    for mut reader in readers {
        match tokio::time::timeout(READER_GRACE, &mut reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Output reader task failed"),
            Err(_) => {
                tracing::debug!("Output still open after command exit, detaching reader");
                reader.abort();
            }
        }
    }

    match status {
        RunStatus::TimedOut => run.log().warn(args![
            "Timed out after",
            format!("{}s", args.timeout.unwrap_or_default())
        ]),
        RunStatus::Failed => run.log().error(args!["Exited with code", code]),
        _ => run.log().info(args!["Exited with code", code]),
    }

    let outcome = RunOutcome::new(status).with_retry(args.retry);
    tracing::debug!(status = %outcome.status, retry = outcome.retry, code, "Command finished");

    if let Err(e) = run.finish(outcome).await {
        eprintln!("smartlog: failed to flush buffered output: {}", e);
    }
    Ok(code)
}

/// Map the command's exit status to a run status and exit code.
fn classify(exit: ExitStatus, skip_code: Option<i32>) -> (RunStatus, i32) {
    match exit.code() {
        Some(0) => (RunStatus::Passed, 0),
        Some(code) if Some(code) == skip_code => (RunStatus::Skipped, code),
        Some(code) => (RunStatus::Failed, code),
        // Killed by a signal
        None => (RunStatus::Failed, 1),
    }
}

/// Forward every line of `reader` to the console hub as a `kind` message.
fn forward_lines<R>(reader: R, hub: ConsoleHub, kind: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => hub.emit(ConsoleMessage::text(kind, line)),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, stream = kind, "Failed to read command output");
                    break;
                }
            }
        }
    })
}
