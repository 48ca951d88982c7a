//! tipwatchd — the tipwatch daemon.
//!
//! Single binary that assembles the monitor:
//! - Node client
//! - Snapshot store
//! - Collector loop
//! - Prometheus exporter
//! - HTTP API
//!
//! # Usage
//!
//! ```text
//! tipwatchd serve --node-url http://localhost:12798 --port 8080 --interval 30s
//! tipwatchd probe --node-url http://localhost:12798
//! ```

mod probe;
mod serve;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tipwatch_core::{ConfigFile, LogFormat, MonitorConfig};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "tipwatch.toml";

#[derive(Parser)]
#[command(name = "tipwatchd", about = "Cardano node monitor daemon", version)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true, env = "TIPWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the node and serve health, status, and metrics (default).
    Serve,

    /// Fetch the node's tip once and print it.
    Probe {
        /// Print nothing; report reachability through the exit status.
        #[arg(long)]
        quiet: bool,
    },
}

/// Flags that override the config file.
#[derive(Args)]
struct Overrides {
    /// Base URL of the node's REST API.
    #[arg(long, global = true, env = "TIPWATCH_NODE_URL")]
    node_url: Option<String>,

    /// Port for the HTTP API.
    #[arg(long, global = true, env = "TIPWATCH_PORT")]
    port: Option<u16>,

    /// Collection interval ("30s", "500ms", "2m").
    #[arg(long, global = true, env = "TIPWATCH_INTERVAL")]
    interval: Option<String>,

    /// Per-call upstream timeout.
    #[arg(long, global = true)]
    request_timeout: Option<String>,

    /// Identifier used in snapshots and metric labels.
    #[arg(long, global = true)]
    node_id: Option<String>,

    /// Log filter directive when RUST_LOG is unset.
    #[arg(long, global = true, env = "TIPWATCH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format: text or json.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

impl Overrides {
    fn to_layer(&self) -> ConfigFile {
        ConfigFile {
            node_url: self.node_url.clone(),
            port: self.port,
            interval: self.interval.clone(),
            request_timeout: self.request_timeout.clone(),
            node_id: self.node_id.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let started_at = Instant::now();
    let cli = Cli::parse();
    let (config, source) = load_config(&cli)?;

    init_tracing(&config);
    debug!(source = %source, ?config, "configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve::run_serve(config, started_at).await,
        Command::Probe { quiet } => probe::run_probe(&config, quiet).await,
    }
}

/// Resolve defaults, then the config file, then flags and env.
///
/// Returns the config and a description of where the file layer came from.
fn load_config(cli: &Cli) -> anyhow::Result<(MonitorConfig, String)> {
    let mut config = MonitorConfig::default();
    let mut source = "defaults".to_string();

    let file = match &cli.config {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| Path::exists(p)),
    };
    if let Some(path) = file {
        config = config.apply(&ConfigFile::from_file(&path)?)?;
        source = path.display().to_string();
    }

    config = config.apply(&cli.overrides.to_layer())?;
    config.validate()?;
    Ok((config, source))
}

fn init_tracing(config: &MonitorConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}
