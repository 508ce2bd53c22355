//! Ride dispatch server
//!
//! Matches drivers (`MOTORISTA`) with passengers (`PASSAGEIRO`) over a
//! line-oriented TCP protocol. Drivers go online and are offered every new
//! ride; the first driver to accept a ride gets it and the passenger is told
//! who is coming.
//!
//! Usage:
//!   ride-dispatch                          # 127.0.0.1:8081
//!   ride-dispatch --port 9000              # Custom port
//!   ride-dispatch --announce-withdrawals   # Tell drivers when offers go away
//!   ride-dispatch --log-file               # Log to ~/.ride-dispatch/logs/dispatch.log

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dispatch_server::{DEFAULT_PLATE, DispatchConfig, DispatchService};
use dispatch_transport::{TransportConfig, TransportServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ride-dispatch", about = "Ride dispatch server for drivers and passengers")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "8081")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Upper bound on a single write to a client, in milliseconds
    #[arg(long, default_value = "5000")]
    write_timeout_ms: u64,

    /// Upper bound on closing a client during cleanup, in milliseconds
    #[arg(long, default_value = "1000")]
    close_timeout_ms: u64,

    /// Plate reported to passengers when a driver did not send one
    #[arg(long, default_value = DEFAULT_PLATE)]
    default_plate: String,

    /// Tell available drivers when a ride they were offered is taken or cancelled
    #[arg(long)]
    announce_withdrawals: bool,

    /// Answer malformed lines with an error instead of ignoring them
    #[arg(long)]
    reject_unknown: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.ride-dispatch/logs/dispatch.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(ref log_file_arg) = cli.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(());
    };

    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    let log_path = if log_file_arg == "DEFAULT" {
        PathBuf::from(&home).join(".ride-dispatch/logs/dispatch.log")
    } else {
        PathBuf::from(log_file_arg)
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();

    eprintln!("Logging to {}", log_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let transport_config = TransportConfig {
        hostname: cli.hostname.clone(),
        port: cli.port,
        max_connections: Some(cli.max_connections),
        write_timeout: Duration::from_millis(cli.write_timeout_ms),
        close_timeout: Duration::from_millis(cli.close_timeout_ms),
        verbose_logging: cli.verbose,
    };

    let dispatch_config = DispatchConfig {
        announce_withdrawals: cli.announce_withdrawals,
        reject_unknown: cli.reject_unknown,
        default_plate: cli.default_plate.clone(),
    };
    info!(
        "Dispatch options: announce_withdrawals={}, reject_unknown={}",
        dispatch_config.announce_withdrawals, dispatch_config.reject_unknown
    );

    let service = DispatchService::new(dispatch_config);
    let mut transport = TransportServer::start(transport_config, service)
        .await
        .context("Failed to start transport")?;

    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Ride dispatch server running on {}", transport.local_addr());
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();
    println!("────────────────────────────────────────────────────────────────");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!();
    println!("  Shutting down...");
    transport.stop().await;
    println!("  Server stopped.");

    Ok(())
}
