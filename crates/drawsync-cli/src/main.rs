#![deny(unsafe_code)]

//! drawsync CLI: offline patching, replays and the daemon entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use drawsync_config::{AppConfig, EngineConfig};
use drawsync_core::dispatch::HistorySummary;
use drawsync_core::llm::ToolCall;
use drawsync_core::{EditOperation, HeadlessEditor, ToolDispatcher, ToolReport, apply_edits, xml};

/// drawsync: keeps an AI agent and a diagram editor in sync.
#[derive(Parser)]
#[command(name = "drawsync", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "drawsync.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a batch of search/replace edits to a diagram file.
    Apply {
        /// Diagram document to patch.
        #[arg(long)]
        document: PathBuf,

        /// JSON array of `{"search": ..., "replace": ...}` objects.
        #[arg(long)]
        edits: PathBuf,

        /// Write the result here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Pretty-print a diagram document.
    Format {
        /// Diagram document to format.
        file: PathBuf,
    },

    /// Run a JSON array of tool calls against an in-process editor.
    Replay {
        /// Script of tool calls.
        script: PathBuf,

        /// Diagram the editor shows before the first call.
        #[arg(long)]
        document: Option<PathBuf>,
    },

    /// Start the drawsync daemon.
    Start,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Peek at the configured level; a broken config file is reported later by
    // the commands that actually need it.
    let configured = AppConfig::load(&cli.config).await.ok();
    let filter = log_filter(cli.verbose, configured.as_ref().map(|c| c.logging.level.as_str()));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Apply {
            document,
            edits,
            output,
        } => cmd_apply(&document, &edits, output.as_deref()).await?,
        Commands::Format { file } => cmd_format(&file).await?,
        Commands::Replay { script, document } => {
            cmd_replay(&cli.config, &script, document.as_deref()).await?
        }
        Commands::Start => cmd_start(&cli.config).await?,
        Commands::Config { show } => cmd_config(&cli.config, show).await?,
    }

    Ok(())
}

/// `-v` flags win over the `[logging]` level.
fn log_filter(verbose: u8, configured: Option<&str>) -> String {
    match (verbose, configured) {
        (0, Some(level)) => level.to_string(),
        (0, None) => "info".to_string(),
        (1, _) => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

async fn cmd_apply(document: &Path, edits: &Path, output: Option<&Path>) -> Result<()> {
    let patched = patch_file(document, edits).await?;
    match output {
        Some(path) => {
            tokio::fs::write(path, &patched)
                .await
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            info!(path = %path.display(), bytes = patched.len(), "Patched diagram written");
        }
        None => println!("{patched}"),
    }
    Ok(())
}

async fn patch_file(document: &Path, edits: &Path) -> Result<String> {
    let source = read(document).await?;
    let edits: Vec<EditOperation> = serde_json::from_str(&read(edits).await?)
        .with_context(|| format!("'{}' is not a JSON array of edits", edits.display()))?;

    let patched = apply_edits(&source, &edits)
        .with_context(|| format!("could not patch '{}'", document.display()))?;
    Ok(patched)
}

async fn cmd_format(file: &Path) -> Result<()> {
    let document = read(file).await?;
    println!("{}", xml::format_xml(&xml::normalize_document(&document)));
    Ok(())
}

async fn cmd_replay(config_path: &Path, script: &Path, document: Option<&Path>) -> Result<()> {
    let config = load_config(config_path).await?;
    let calls: Vec<ToolCall> = serde_json::from_str(&read(script).await?)
        .with_context(|| format!("'{}' is not a JSON array of tool calls", script.display()))?;
    let initial = match document {
        Some(path) => Some(read(path).await?),
        None => None,
    };

    let (reports, summary) = replay(&calls, initial.as_deref(), &config.engine).await?;
    for report in &reports {
        println!("{}", serde_json::to_string(report)?);
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    info!(calls = reports.len(), failed, "Replay finished");
    Ok(())
}

/// Dispatch `calls` in order against a fresh headless editor.
async fn replay(
    calls: &[ToolCall],
    initial: Option<&str>,
    config: &EngineConfig,
) -> Result<(Vec<ToolReport>, HistorySummary)> {
    let dispatcher = ToolDispatcher::from_config(Arc::new(HeadlessEditor::new()), config);
    if let Some(document) = initial {
        dispatcher
            .load_host_document(document)
            .await
            .context("initial diagram was rejected")?;
    }

    let mut reports = Vec::with_capacity(calls.len());
    for call in calls {
        reports.push(dispatcher.dispatch(call).await);
    }
    Ok((reports, dispatcher.history_summary()))
}

async fn cmd_start(config_path: &Path) -> Result<()> {
    let config = load_config(config_path).await?;
    info!("Starting drawsync daemon");

    let daemon = drawsync_core::Daemon::new(config);
    daemon.run().await?;

    Ok(())
}

async fn cmd_config(config_path: &Path, show: bool) -> Result<()> {
    let config = load_config(config_path).await?;
    if show {
        let toml_str = toml::to_string_pretty(&config).context("TOML error")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("invalid configuration '{}'", path.display()))
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(AppConfig::default())
    }
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))
}
