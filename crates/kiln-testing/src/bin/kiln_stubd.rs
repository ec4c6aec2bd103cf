//! kiln-stubd - in-memory kiln daemon for manual testing.
//!
//! Serves the control socket protocol from memory so `kilnctl` can be
//! exercised without a real daemon.

use anyhow::{Context, Result};
use clap::Parser;
use kiln_core::config::RpcConfig;
use kiln_core::platform::{fs, process};
use kiln_testing::{MemoryDaemon, StubDaemon};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "kiln-stubd")]
#[command(about = "In-memory kiln daemon speaking the control socket protocol")]
struct Args {
    /// Socket path to listen on
    #[arg(short, long, env = RpcConfig::SOCKET_PATH_ENV, default_value = RpcConfig::DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Write the daemon PID here while running
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    if let Err(e) = process::set_process_name("kiln-stubd") {
        warn!("Could not set process name: {}", e);
    }

    let _pid_file = match &args.pid_file {
        Some(path) => Some(
            process::PidFile::create(path, 0o644)
                .with_context(|| format!("another stub daemon owns {}", path.display()))?,
        ),
        None => None,
    };

    // A previous run killed without cleanup leaves its socket behind.
    if fs::file_type(&args.socket).ok() == Some(fs::FileType::Socket) {
        fs::remove_file(&args.socket)?;
    }

    info!(
        "Starting kiln-stubd (pid {}) on {}",
        process::current_pid(),
        process::host_name().unwrap_or_else(|_| "unknown host".to_string())
    );

    let server = StubDaemon::bind(&args.socket)
        .with_context(|| format!("failed to bind {}", args.socket.display()))?;

    server
        .serve(Arc::new(MemoryDaemon::new()), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;

    info!("Shutdown signal received, exiting");
    Ok(())
}
