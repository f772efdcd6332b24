//! Memoapi CLI - standalone server for publishing PDF memos

use clap::Parser;
use memoapi::config::expand_path;
use memoapi::{Config, Core};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "memoapi")]
#[command(version)]
#[command(about = "Memoapi - REST service for publishing PDF memos", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.memoapi/config.toml")]
    config: PathBuf,

    /// Override server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override server host
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Initialize a new config file with defaults
    #[arg(long)]
    init: bool,

    /// Print an Argon2 hash of the given password for `auth.password_hash` and exit
    #[arg(long, value_name = "PASSWORD")]
    hash_password: Option<String>,

    /// Also write logs to this file, rotated daily
    #[arg(long, env = "MEMOAPI_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("memoapi={},tower_http=debug", log_level).into());
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    let _file_guard = if let Some(path) = &args.log_file {
        let path = expand_path(path);
        let dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("memoapi.log");
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
        Some(guard)
    } else {
        registry.init();
        None
    };

    if let Some(password) = &args.hash_password {
        println!("{}", memoapi::api::hash_password(password)?);
        return Ok(());
    }

    // Handle --init flag
    if args.init {
        let config_path = expand_path(&args.config);
        if config_path.exists() {
            tracing::warn!("Config file already exists: {}", config_path.display());
            return Ok(());
        }
        Config::create_default(&config_path)?;
        tracing::info!("Created default config at: {}", config_path.display());
        return Ok(());
    }

    // Load configuration
    let config_path = expand_path(&args.config);
    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            config_path.display()
        );
        Config::default()
    };
    config.apply_env_overrides();

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let core = Core::new(config)?;

    // Blocks until shutdown
    core.start_api_server().await?;

    Ok(())
}
