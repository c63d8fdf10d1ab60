//! WebShell Daemon
//!
//! Serves browser terminal sessions over WebSocket.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::logging;
use daemon::orchestrator::{DaemonOrchestrator, OrchestratorEvent};

/// WebShell Daemon - browser terminal sessions over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "webshell-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the WebShell daemon
    Start {
        /// Address to listen on, overriding the configuration
        #[arg(long, value_name = "ADDR")]
        listen: Option<SocketAddr>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Write it to the configuration file instead of printing it
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();

    match cli.command {
        Commands::Config { write: false } => {
            print!("{}", config.to_toml()?);
        }
        Commands::Config { write: true } => {
            let path = cli.config.clone().unwrap_or_else(default_config_path);
            config.validate()?;
            config.save(&path)?;
            println!("Configuration written to {}", path.display());
        }
        Commands::Start { listen } => {
            if let Some(addr) = listen {
                config.daemon.listen_addr = addr;
            }
            config.validate()?;

            let filter = logging::build_filter(&config.daemon.log_level, cli.verbose);
            let _guard = logging::init(filter, config.daemon.log_file.as_deref())
                .context("Failed to initialise logging")?;

            tracing::info!("WebShell daemon starting...");
            if let Some(path) = &cli.config {
                tracing::info!("Using config file: {:?}", path);
            }

            let mut orchestrator = DaemonOrchestrator::new(config)?;
            run_headless(&mut orchestrator).await?;
        }
    }

    Ok(())
}

/// Run the daemon until SIGINT or SIGTERM.
async fn run_headless(orchestrator: &mut DaemonOrchestrator) -> anyhow::Result<()> {
    let mut events = orchestrator.subscribe();

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                OrchestratorEvent::StateChanged(state) => {
                    tracing::info!("Orchestrator state: {:?}", state);
                }
                OrchestratorEvent::ConnectionOpened {
                    connection_id,
                    peer,
                } => {
                    tracing::debug!("Connection {} opened from {}", connection_id, peer);
                }
                OrchestratorEvent::ConnectionClosed { connection_id } => {
                    tracing::debug!("Connection {} closed", connection_id);
                }
                OrchestratorEvent::SessionsReaped { session_ids } => {
                    tracing::info!("Reaped {} idle session(s)", session_ids.len());
                }
                OrchestratorEvent::Error { message } => {
                    tracing::error!("Orchestrator error: {}", message);
                }
            }
        }
    });

    let addr = orchestrator.start().await?;
    tracing::info!("Listening on {}", addr);

    wait_for_shutdown_signal().await?;

    orchestrator.stop().await?;
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Received Ctrl+C");
    Ok(())
}
