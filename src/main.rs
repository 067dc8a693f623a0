use anyhow::{Context, Result};
use clap::Parser;
use slpd::logging::init_tracing;
use slpd::SlpDaemon;
use slpd_core::config::LogFormat;
use slpd_core::DaemonConfig;
use std::path::PathBuf;
use tracing::{error, info};

/// slpd - Service Location daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SLPD_CONFIG")]
    config: Option<PathBuf>,

    /// Override the RPC control port
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Override the HTTP diagnostics port
    #[arg(long)]
    http_port: Option<u16>,

    /// Enable HTTP diagnostics
    #[arg(long)]
    enable_http: bool,

    /// Do not read console commands from stdin
    #[arg(long)]
    no_console: bool,

    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,

    /// Override the log format (text or json)
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

fn parse_log_format(value: &str) -> std::result::Result<LogFormat, String> {
    match value {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format '{}'", other)),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DaemonConfig::from_config_builder(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(port) = args.rpc_port {
        config.rpc.port = port;
    }
    if let Some(port) = args.http_port {
        config.http.port = port;
    }
    if args.enable_http {
        config.http.enabled = true;
    }
    if args.no_console {
        config.console.enabled = false;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    config.validate().context("Invalid configuration")?;
    init_tracing(&config.logging);

    info!(
        rpc_port = config.rpc.port,
        http = config.http.enabled,
        console = config.console.enabled,
        scopes = %config.engine.scopes,
        "Starting SLP daemon"
    );

    let daemon = SlpDaemon::new(config).context("Failed to create daemon")?;
    if let Err(e) = daemon.init() {
        error!(error = %e, "Daemon initialization failed");
        return Err(e).context("Failed to initialize daemon");
    }

    daemon.watch_shutdown_signals();
    daemon.run();
    Ok(())
}
