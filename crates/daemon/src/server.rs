//! HTTP and WebSocket front door.
//!
//! `GET /ws` upgrades to the terminal protocol. Each socket gets one reader
//! loop (this task) and one writer task draining the connection's outbound
//! queue. The remaining routes are plain JSON.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::{get, MethodRouter},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use protocol::{FrameCodec, HandshakeParams, MAX_FRAME_SIZE};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionHandler, ConnectionSettings};
use crate::metadata::{ApiResponse, MetadataKind, MetadataService};
use crate::orchestrator::OrchestratorEvent;
use crate::session::{HistoryQuery, SessionRegistry};

/// How long a closing connection waits for its writer to flush.
const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Socket-level message cap. Kept well above the codec's frame limit so an
/// oversized frame reaches the codec and is dropped there instead of
/// failing the socket.
const SOCKET_MESSAGE_LIMIT: usize = MAX_FRAME_SIZE * 4;

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub metadata: Arc<dyn MetadataService>,
    pub settings: ConnectionSettings,
    pub shutdown: CancellationToken,
    pub events: broadcast::Sender<OrchestratorEvent>,
}

impl AppState {
    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.events.send(event);
    }
}

/// Builds the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/sessions", get(sessions_handler))
        .route("/api/instance/replay/list", get(history_handler))
        .route("/api/instance/env", metadata_route(MetadataKind::Environments))
        .route("/api/instance/product", metadata_route(MetadataKind::Products))
        .route("/api/zeus/tag", metadata_route(MetadataKind::Tags))
        .route("/api/instance/username", metadata_route(MetadataKind::Usernames))
        .route("/api/node/list", metadata_route(MetadataKind::Nodes))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "sessions": state.registry.len() }))
}

async fn sessions_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.registry.list()))
}

async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    Json(ApiResponse::success(state.registry.history().query(&query)))
}

fn metadata_route(kind: MetadataKind) -> MethodRouter<AppState> {
    get(move |State(state): State<AppState>| async move {
        Json(ApiResponse::success(state.metadata.list(kind)))
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<HandshakeParams>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.max_message_size(SOCKET_MESSAGE_LIMIT)
        .on_upgrade(move |socket| serve_socket(socket, state, params, peer))
}

/// Runs one WebSocket connection to completion.
pub async fn serve_socket(
    socket: WebSocket,
    state: AppState,
    params: HandshakeParams,
    peer: SocketAddr,
) {
    let (mut handler, mut outbound_rx, mut events_rx) =
        ConnectionHandler::new(Arc::clone(&state.registry), state.settings, Some(peer));
    let connection_id = handler.id().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    info!(
        connection_id = %connection_id,
        peer = %peer,
        target = ?params.ip,
        role = ?params.role,
        "WebSocket connection established"
    );
    state.emit(OrchestratorEvent::ConnectionOpened {
        connection_id: connection_id.clone(),
        peer,
    });

    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        let codec = FrameCodec::new();
        while let Some(frame) = outbound_rx.recv().await {
            let text = match codec.encode(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(connection_id = %writer_id, error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
        debug!(connection_id = %writer_id, "Writer task finished");
    });

    match handler.open(&params).await {
        Ok(session_id) => {
            debug!(connection_id = %connection_id, session_id = %session_id, "Handshake complete");
            read_loop(&mut handler, &mut ws_rx, &mut events_rx, &state.shutdown).await;
        }
        Err(e) => warn!(connection_id = %connection_id, error = %e, "Handshake failed"),
    }

    handler.shutdown();
    drop(handler);

    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_GRACE, writer).await.is_err() {
        warn!(connection_id = %connection_id, "Writer did not finish in time, aborting");
        abort.abort();
    }

    info!(connection_id = %connection_id, "WebSocket connection closed");
    state.emit(OrchestratorEvent::ConnectionClosed { connection_id });
}

async fn read_loop(
    handler: &mut ConnectionHandler,
    ws_rx: &mut futures_util::stream::SplitStream<WebSocket>,
    events_rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::session::ConnectionEvent>,
    shutdown: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(connection_id = %handler.id(), "Server shutting down");
                break;
            }
            Some(event) = events_rx.recv() => {
                match handler.handle_event(event).await {
                    Ok(true) => {}
                    Ok(false) => {
                        info!(connection_id = %handler.id(), "No sessions left, closing");
                        break;
                    }
                    Err(e) => {
                        warn!(connection_id = %handler.id(), error = %e, "Connection failed");
                        break;
                    }
                }
            }
            message = ws_rx.next() => {
                let result = match message {
                    Some(Ok(Message::Text(text))) => handler.handle_text(&text).await,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => handler.handle_text(&text).await,
                        Err(_) => {
                            warn!(connection_id = %handler.id(), "Dropping non-UTF-8 binary frame");
                            Ok(())
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(
                            connection_id = %handler.id(),
                            reason = ?frame.map(|f| f.reason.to_string()),
                            "Client closed websocket"
                        );
                        break;
                    }
                    Some(Ok(_)) => Ok(()),
                    Some(Err(e)) => {
                        warn!(connection_id = %handler.id(), error = %e, "Error receiving message");
                        break;
                    }
                    None => break,
                };

                if let Err(e) = result {
                    warn!(connection_id = %handler.id(), error = %e, "Connection failed");
                    break;
                }
            }
        }
    }
}
