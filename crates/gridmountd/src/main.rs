//! gridmountd: mounts a chunked object store as a staging filesystem
//!
//! Usage:
//!   gridmountd [--config /etc/gridmount/config.toml] [--host URL] [--db PREFIX] <MOUNTPOINT>
//!
//! Runs in the foreground until the mountpoint is unmounted
//! (`fusermount3 -u <MOUNTPOINT>`).

mod daemon;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gridmount_core::config::{default_config_path, is_world_readable, GridConfig};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "gridmountd",
    version,
    about = "Mount a chunked object store as a local filesystem"
)]
struct Cli {
    /// Directory to mount on
    mountpoint: PathBuf,

    /// Path to the gridmount.toml configuration file
    #[arg(long, short = 'c', env = "GRIDMOUNT_CONFIG")]
    config: Option<PathBuf>,

    /// Object store endpoint (overrides storage.endpoint)
    #[arg(long, env = "GRIDMOUNT_HOST")]
    host: Option<String>,

    /// Object prefix used as the database (overrides store.prefix)
    #[arg(long, env = "GRIDMOUNT_DB")]
    db: Option<String>,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Log level (trace, debug, info, warn, error); defaults to daemon.log_level
    #[arg(long, env = "GRIDMOUNT_LOG")]
    log: Option<String>,

    /// Log format; defaults to daemon.log_format
    #[arg(long, env = "GRIDMOUNT_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config_found = config_path.exists();
    let mut config = if config_found {
        GridConfig::load(&config_path)
            .with_context(|| format!("loading config {}", config_path.display()))?
    } else {
        GridConfig::default()
    };

    let level = cli.log.clone().unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.daemon.log_format));
    init_logging(&level, format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        mountpoint = %cli.mountpoint.display(),
        "gridmountd starting"
    );
    if !config_found {
        warn!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    } else if config.config_file_mode_check && is_world_readable(&config_path) {
        warn!(path = %config_path.display(), "config file is world-readable");
    }

    apply_overrides(&mut config, &cli);
    config.validate().context("invalid configuration")?;

    daemon::run(config, cli.mountpoint).await
}

fn apply_overrides(config: &mut GridConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.storage.endpoint = host.clone();
    }
    if let Some(db) = &cli.db {
        config.store.prefix = db.clone();
    }
    if cli.allow_other {
        config.mount.allow_other = true;
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
