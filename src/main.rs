//! Toolbridge operator CLI.
//!
//! Usage:
//!   toolbridge init               Write a default config and create the registry
//!   toolbridge register <file>    Register manifests from a JSON or YAML file
//!   toolbridge tools              List registered manifests
//!   toolbridge inspect <name>     Show a manifest, its versions and adapter shapes
//!   toolbridge logs               Show execution records
//!   toolbridge stats <name>       Show success and anomaly counts for a tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use toolbridge::adapter::schema;
use toolbridge::config::{self, BridgeConfig};
use toolbridge::source::load_manifest_file;
use toolbridge::state::SqliteStore;
use toolbridge::types::*;
use toolbridge::Bridge;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "toolbridge")]
#[command(version = "0.1.0")]
#[command(about = "Validating, fingerprinting tool adapters for agent frameworks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to toolbridge home directory.
    #[arg(long, default_value = "~/.toolbridge")]
    home: String,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config and create the registry database.
    Init,

    /// Register manifests from a JSON or YAML file.
    Register {
        file: PathBuf,

        /// Source name stamped on the manifests (defaults to `server_name`).
        #[arg(long)]
        source: Option<String>,
    },

    /// List registered manifests.
    Tools,

    /// Show a manifest, its history and its adapter shapes.
    Inspect { name: String },

    /// Show execution records, oldest first.
    Logs {
        #[arg(long)]
        framework: Option<Framework>,

        #[arg(long)]
        tool: Option<String>,

        /// Only anomalous records.
        #[arg(long)]
        anomalies: bool,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Print one JSON object per line.
        #[arg(long)]
        json: bool,

        /// Keep printing new records until Ctrl+C.
        #[arg(long)]
        follow: bool,
    },

    /// Show success and anomaly counts for a tool.
    Stats { name: String },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve home directory
    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());
    let config_path = home_dir.join("toolbridge.toml");
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize logging
    let level = cli.log_level.clone().unwrap_or_else(|| cfg.log_level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => cmd_init(&home_dir, cfg).await,
        Commands::Register { file, source } => cmd_register(cfg, &file, source).await,
        Commands::Tools => cmd_tools(cfg).await,
        Commands::Inspect { name } => cmd_inspect(cfg, &name).await,
        Commands::Logs {
            framework,
            tool,
            anomalies,
            limit,
            json,
            follow,
        } => {
            let mut filter = RecordFilter::new();
            filter.framework = framework;
            filter.tool_name = tool;
            filter.anomalies_only = anomalies;
            cmd_logs(cfg, filter, limit, json, follow).await
        }
        Commands::Stats { name } => cmd_stats(cfg, &name).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_init(home_dir: &Path, cfg: BridgeConfig) -> Result<()> {
    std::fs::create_dir_all(home_dir)
        .with_context(|| format!("Failed to create home directory: {}", home_dir.display()))?;

    let config_path = home_dir.join("toolbridge.toml");
    if config_path.exists() {
        println!("Config already present at {}", config_path.display());
    } else {
        config::save_config(&cfg, &config_path)?;
        println!("{} Wrote {}", ">>>".green().bold(), config_path.display());
    }

    let db_path = cfg.resolved_db_path();
    SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    println!("{} Registry ready at {}", ">>>".green().bold(), db_path);
    Ok(())
}

async fn cmd_register(cfg: BridgeConfig, file: &Path, source: Option<String>) -> Result<()> {
    let source = source.unwrap_or_else(|| cfg.server_name.clone());
    let raw = load_manifest_file(file)?;
    let bridge = bootstrap(cfg)?;

    let registered = bridge.register_raw(&raw, &source).await;
    for (manifest, fingerprint) in &registered {
        println!(
            "  {} {} [{}]",
            "+".green().bold(),
            manifest.name().bold(),
            fingerprint.short()
        );
    }

    let skipped = raw.len() - registered.len();
    if skipped > 0 {
        println!(
            "{} {} manifest(s) skipped, see log output",
            "!".yellow().bold(),
            skipped
        );
    }
    info!("Registered {} of {} manifests from {}", registered.len(), raw.len(), file.display());
    Ok(())
}

async fn cmd_tools(cfg: BridgeConfig) -> Result<()> {
    let bridge = bootstrap(cfg)?;
    let manifests = bridge.registry().list_manifests().await?;

    if manifests.is_empty() {
        println!("No tools registered.");
        return Ok(());
    }

    println!();
    println!("{}", "=== Registered Tools ===".bold());
    println!();
    for stored in &manifests {
        let m = &stored.manifest;
        println!(
            "  {:<24} {}  {:<12} {} param(s) -> {}  {}",
            m.name().bold(),
            stored.fingerprint.short().dimmed(),
            m.source(),
            m.parameters().len(),
            m.return_type(),
            stored.registered_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        );
    }
    println!();
    Ok(())
}

async fn cmd_inspect(cfg: BridgeConfig, name: &str) -> Result<()> {
    let bridge = bootstrap(cfg)?;
    let history = bridge.registry().manifest_history(name).await?;
    let manifest = bridge.registry().get_manifest(name).await?;

    println!();
    println!("{}", format!("=== {} ===", manifest.name()).bold());
    println!();
    println!("  {}:  {}", "Source".bold(), manifest.source());
    println!("  {}:  {}", "Description".bold(), schema::tool_description(&manifest));
    println!("  {}:  {}", "Returns".bold(), manifest.return_type());
    println!("  {}:", "Parameters".bold());
    for param in manifest.parameters() {
        let marker = if param.required { "*" } else { " " };
        println!("    {}{:<20} {}", marker, param.name, param.param_type);
    }

    println!();
    println!("  {}:", "Versions".bold());
    for stored in &history {
        println!(
            "    {}  {}",
            stored.fingerprint.short(),
            stored.registered_at.to_rfc3339()
        );
    }

    println!();
    println!("  {}:", "Adapters".bold());
    for framework in Framework::ALL {
        match schema::check_representable(&manifest, framework) {
            Ok(()) => println!("    {:<10} {}", framework.as_str(), "ok".green()),
            Err(e) => println!("    {:<10} {}", framework.as_str(), e.reason.red()),
        }
    }

    println!();
    let args_schema = schema::args_schema(&manifest, bridge.config().strict_mode);
    println!("{}", serde_json::to_string_pretty(&args_schema)?);
    Ok(())
}

async fn cmd_logs(
    cfg: BridgeConfig,
    filter: RecordFilter,
    limit: usize,
    json: bool,
    follow: bool,
) -> Result<()> {
    let bridge = bootstrap(cfg)?;
    let mut cursor = bridge.registry().list_records(filter);

    for record in cursor.take(limit).await? {
        print_record(&record, json)?;
    }

    if !follow {
        return Ok(());
    }

    // Drain what the limit left behind so only new records are printed.
    cursor.poll().await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                for record in cursor.poll().await? {
                    print_record(&record, json)?;
                }
            }
        }
    }
    Ok(())
}

async fn cmd_stats(cfg: BridgeConfig, name: &str) -> Result<()> {
    let bridge = bootstrap(cfg)?;
    let stats = bridge.registry().tool_stats(name).await?;

    println!();
    println!("{}", format!("=== {} ===", stats.tool_name).bold());
    println!();
    println!("  {}:     {}", "Calls".bold(), stats.total);
    println!("  {}: {}", "Anomalies".bold(), stats.anomalies);
    println!("  {}:   {}", "Success".bold(), colorize_rate(stats.success_rate));
    if let Some(reason) = &stats.last_anomaly {
        println!("  {}:      {}", "Last".bold(), reason.yellow());
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Open the registry database and wire up the bridge.
fn bootstrap(cfg: BridgeConfig) -> Result<Bridge> {
    let db_path = cfg.resolved_db_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    Ok(Bridge::new(cfg, Arc::new(store)))
}

fn print_record(record: &ExecutionRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(record)?);
        return Ok(());
    }

    let status = colorize_status(record.status, record.is_anomaly);
    println!(
        "{}  {:<9} {:<20} {:<10} {:>6}ms  {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        record.framework.as_str(),
        record.tool_name,
        status,
        record.duration_ms,
        record.anomaly_reason.as_deref().unwrap_or(""),
    );
    Ok(())
}

fn colorize_status(status: RecordStatus, anomaly: bool) -> String {
    let text = status.to_string();
    match status {
        RecordStatus::Success if anomaly => text.yellow().to_string(),
        RecordStatus::Success => text.green().to_string(),
        RecordStatus::Rejected => text.yellow().to_string(),
        RecordStatus::Error | RecordStatus::Timeout => text.red().to_string(),
        RecordStatus::Cancelled => text.dimmed().to_string(),
    }
}

fn colorize_rate(rate: f64) -> String {
    let text = format!("{:.1}%", rate * 100.0);
    if rate >= 0.95 {
        text.green().to_string()
    } else if rate >= 0.8 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}
