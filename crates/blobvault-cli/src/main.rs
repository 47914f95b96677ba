// crates/blobvault-cli/src/main.rs
// ============================================================================
// Module: Blobvault CLI Entry Point
// Description: Command dispatcher for serving and inspecting tenant stores.
// Purpose: Start the blob server or list persisted tenants.
// Dependencies: clap, tokio, blobvault-config, blobvault-server
// ============================================================================

//! ## Overview
//! `blobvault serve` loads configuration, enumerates persisted tenants, and
//! serves the multipart endpoint until interrupted. `blobvault tenants`
//! prints one tenant identifier per line. Startup failures exit non-zero with
//! a single stderr line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use blobvault_config::BlobvaultConfig;
use blobvault_server::BlobServer;
use blobvault_store_sqlite::TenantRegistry;
use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "blobvault", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the blob server.
    Serve(ServeCommand),
    /// List persisted tenant identifiers.
    Tenants(TenantsCommand),
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file path (defaults to `BLOBVAULT_CONFIG` or ./blobvault.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Bind address override (e.g. 127.0.0.1:8080).
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

/// Arguments for `tenants`.
#[derive(Args, Debug)]
struct TenantsCommand {
    /// Config file path (defaults to `BLOBVAULT_CONFIG` or ./blobvault.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("blobvault {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };
    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Tenants(command) => command_tenants(&command),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Starts the server and blocks until ctrl-c.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let mut config = load_config(command.config)?;
    if let Some(bind) = command.bind {
        config.server.bind = bind;
    }

    let server = tokio::task::spawn_blocking(move || BlobServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    for path in &server.enumeration().skipped {
        write_stderr_line(&format!("blobvault: skipped non-tenant file {}", path.display()))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    write_stderr_line(&format!(
        "blobvault: serving {} tenant(s) from {} on {}",
        server.registry().len(),
        server.registry().base_dir().display(),
        server.config().server.bind
    ))
    .map_err(|err| CliError::new(output_error("stderr", &err)))?;

    server
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints persisted tenant identifiers, one per line.
fn command_tenants(command: &TenantsCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.clone())?;
    let (registry, report) = TenantRegistry::open(config.storage.to_store_config())
        .map_err(|err| CliError::new(format!("tenant enumeration failed: {err}")))?;
    for path in &report.skipped {
        write_stderr_line(&format!("blobvault: skipped non-tenant file {}", path.display()))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let ids = registry.tenant_ids().map_err(|err| CliError::new(err.to_string()))?;
    for id in ids {
        write_stdout_line(id.as_str()).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Loads configuration from an explicit path or the default locations.
fn load_config(path: Option<PathBuf>) -> CliResult<BlobvaultConfig> {
    BlobvaultConfig::load(path.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
