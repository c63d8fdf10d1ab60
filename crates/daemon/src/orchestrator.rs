//! Daemon orchestrator for wiring together all components.
//!
//! This module provides the `DaemonOrchestrator` that builds the executor,
//! session registry and metadata service from configuration, then runs the
//! HTTP/WebSocket server and the idle reaper until stopped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::TerminalSize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::ConnectionSettings;
use crate::executor;
use crate::metadata::{MetadataService, StaticMetadata};
use crate::server::{self, AppState};
use crate::session::{IdleReaper, RegistrySettings, SessionId, SessionRegistry};

/// Reason given to sessions removed during shutdown.
const SHUTDOWN_REASON: &str = "server shutting down";

/// Daemon orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Initial state, not started.
    Stopped,
    /// Binding the listener and spawning tasks.
    Starting,
    /// Running and accepting connections.
    Running,
    /// Shutting down gracefully.
    ShuttingDown,
}

/// Events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Orchestrator state changed.
    StateChanged(OrchestratorState),
    /// A WebSocket connection completed its upgrade.
    ConnectionOpened {
        connection_id: String,
        peer: SocketAddr,
    },
    /// A WebSocket connection ended.
    ConnectionClosed { connection_id: String },
    /// The idle reaper removed sessions.
    SessionsReaped { session_ids: Vec<SessionId> },
    /// Error occurred.
    Error { message: String },
}

/// Daemon orchestrator that manages all subsystems.
pub struct DaemonOrchestrator {
    /// Configuration.
    config: Config,
    /// Current state.
    state: Arc<RwLock<OrchestratorState>>,
    /// Registry shared by every connection.
    registry: Arc<SessionRegistry>,
    /// Metadata listings.
    metadata: Arc<dyn MetadataService>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
    /// Event sender.
    event_tx: broadcast::Sender<OrchestratorEvent>,
    /// Server and reaper tasks.
    tasks: Vec<JoinHandle<()>>,
    /// Bound address once started.
    local_addr: Option<SocketAddr>,
}

impl DaemonOrchestrator {
    /// Creates a new daemon orchestrator.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let executor = executor::from_config(&config.executor);
        info!(executor = executor.name(), "Command executor ready");

        let registry = Arc::new(SessionRegistry::new(
            executor,
            RegistrySettings {
                max_sessions: config.session.max_sessions,
                prompt: config.session.prompt.clone(),
                history_limit: config.session.history_limit,
            },
        ));
        let metadata: Arc<dyn MetadataService> =
            Arc::new(StaticMetadata::new(config.metadata.clone()));

        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            registry,
            metadata,
            shutdown_token: CancellationToken::new(),
            event_tx,
            tasks: Vec::new(),
            local_addr: None,
        })
    }

    /// Returns the current state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Returns a receiver for orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// Binds the listener, spawns the server and reaper, and returns the
    /// bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                anyhow::bail!("Orchestrator is already running");
            }
            *state = OrchestratorState::Starting;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Starting));

        info!("Starting daemon orchestrator...");

        let listen_addr = self.config.daemon.listen_addr;
        let listener = match tokio::net::TcpListener::bind(listen_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.state.write().await = OrchestratorState::Stopped;
                self.emit_event(OrchestratorEvent::Error {
                    message: e.to_string(),
                });
                return Err(e).with_context(|| format!("Failed to bind {}", listen_addr));
            }
        };
        let local_addr = listener
            .local_addr()
            .context("Failed to read bound address")?;

        let app_state = AppState {
            registry: Arc::clone(&self.registry),
            metadata: Arc::clone(&self.metadata),
            settings: self.connection_settings(),
            shutdown: self.shutdown_token.clone(),
            events: self.event_tx.clone(),
        };
        let app = server::router(app_state);

        let shutdown = self.shutdown_token.clone();
        let event_tx = self.event_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let serve = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await });

            if let Err(e) = serve.await {
                warn!(error = %e, "HTTP server exited with error");
                let _ = event_tx.send(OrchestratorEvent::Error {
                    message: e.to_string(),
                });
            }
            debug!("HTTP server task finished");
        }));

        let reaper = IdleReaper::new(
            Arc::clone(&self.registry),
            Duration::from_secs(self.config.session.idle_timeout_secs),
            Duration::from_secs(self.config.session.reap_interval_secs),
        );
        let event_tx = self.event_tx.clone();
        self.tasks.push(reaper.spawn(self.shutdown_token.clone(), move |session_ids| {
            let _ = event_tx.send(OrchestratorEvent::SessionsReaped { session_ids });
        }));
        debug!("Started idle reaper");

        self.local_addr = Some(local_addr);
        *self.state.write().await = OrchestratorState::Running;
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Running));

        info!(
            listen_addr = %local_addr,
            on_disconnect = %self.config.session.on_disconnect,
            "Daemon orchestrator started successfully"
        );
        Ok(local_addr)
    }

    /// Stops the daemon orchestrator gracefully.
    pub async fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == OrchestratorState::Stopped {
                return Ok(());
            }
            if *state == OrchestratorState::ShuttingDown {
                anyhow::bail!("Orchestrator is already shutting down");
            }
            *state = OrchestratorState::ShuttingDown;
        }
        self.emit_event(OrchestratorEvent::StateChanged(
            OrchestratorState::ShuttingDown,
        ));

        info!("Stopping daemon orchestrator...");

        // Signal shutdown to all tasks
        self.shutdown_token.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        for info in self.registry.list() {
            debug!(session_id = %info.id, attached = info.attached, "Removing session");
        }
        let removed = self.registry.clear(SHUTDOWN_REASON);
        info!(sessions = removed, "Sessions removed");

        self.local_addr = None;
        *self.state.write().await = OrchestratorState::Stopped;
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Stopped));

        info!("Daemon orchestrator stopped");
        Ok(())
    }

    /// Emits an orchestrator event.
    fn emit_event(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            on_disconnect: self.config.session.on_disconnect,
            default_size: TerminalSize::new(
                self.config.session.default_cols,
                self.config.session.default_rows,
            ),
        }
    }

    /// Returns the session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Returns the shutdown token for external tasks to observe shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }
}
