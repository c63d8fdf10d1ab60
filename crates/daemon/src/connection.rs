//! Per-connection frame dispatch.
//!
//! A `ConnectionHandler` owns the set of sessions one WebSocket has opened
//! or attached. Inbound text frames are decoded and routed to the addressed
//! session; everything the sessions produce goes out through a single
//! bounded channel so a single writer task preserves frame order.
//!
//! The handler does no socket I/O itself, which keeps it testable without
//! a live server.

use std::net::SocketAddr;
use std::sync::Arc;

use protocol::{ClientFrame, FrameCodec, HandshakeParams, ProtocolError, ServerFrame, TerminalSize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DisconnectPolicy;
use crate::session::{
    ConnectionEvent, ConnectionId, SessionError, SessionHandle, SessionId, SessionMetadata,
    SessionRegistry, TransportHandle,
};

/// Capacity of the outbound frame queue.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Reason sent when a client closes its own session.
pub const CLOSED_BY_CLIENT: &str = "closed by client";

/// Reason sent when another connection takes a session over.
pub const TAKEN_OVER: &str = "attached by another connection";

/// Reason logged when a session is destroyed because its connection closed.
pub const CONNECTION_CLOSED: &str = "connection closed";

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The socket or writer went away.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame could not be handled.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session lookup or creation failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Attaching an existing session while the disconnect policy is
    /// `destroy`.
    #[error("cannot attach session {0}: reattachment is disabled")]
    ReattachDisabled(SessionId),
}

/// Behaviour knobs shared by all connections.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// What happens to attached sessions when the connection closes.
    pub on_disconnect: DisconnectPolicy,
    /// Size used when a handshake or `open` frame omits dimensions.
    pub default_size: TerminalSize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            on_disconnect: DisconnectPolicy::Destroy,
            default_size: TerminalSize::default(),
        }
    }
}

/// Routes frames between one connection and its sessions.
pub struct ConnectionHandler {
    id: ConnectionId,
    registry: Arc<SessionRegistry>,
    settings: ConnectionSettings,
    codec: FrameCodec,
    peer: Option<SocketAddr>,
    /// Sessions routed through this connection; the first is the primary.
    sessions: Vec<SessionId>,
    outbound: mpsc::Sender<ServerFrame>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionHandler {
    /// Creates a handler plus the receivers its worker task must drain:
    /// outbound frames for the writer and out-of-band session events.
    pub fn new(
        registry: Arc<SessionRegistry>,
        settings: ConnectionSettings,
        peer: Option<SocketAddr>,
    ) -> (
        Self,
        mpsc::Receiver<ServerFrame>,
        mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let handler = Self {
            id: uuid::Uuid::new_v4().to_string(),
            registry,
            settings,
            codec: FrameCodec::new(),
            peer,
            sessions: Vec::new(),
            outbound,
            events_tx,
        };

        (handler, outbound_rx, events_rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sessions currently routed through this connection.
    pub fn sessions(&self) -> &[SessionId] {
        &self.sessions
    }

    /// The session frames without a `terminalId` go to.
    pub fn primary(&self) -> Option<&str> {
        self.sessions.first().map(String::as_str)
    }

    /// Completes the handshake: reattaches the requested session or creates
    /// a new one, then sends `init` and the prompt.
    pub async fn open(&mut self, params: &HandshakeParams) -> Result<SessionId, ConnectionError> {
        if let Some(requested) = params.reattach_id() {
            if self.settings.on_disconnect == DisconnectPolicy::Destroy {
                info!(
                    connection_id = %self.id,
                    session_id = %requested,
                    "Reattachment disabled, creating a new session"
                );
                return self.open_new(params).await;
            }
            match self.attach(requested).await {
                Ok(()) => return Ok(requested.to_string()),
                Err(ConnectionError::Session(SessionError::NotFound(_))) => {
                    info!(
                        connection_id = %self.id,
                        session_id = %requested,
                        "Requested session not found, creating a new one"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.open_new(params).await
    }

    async fn open_new(&mut self, params: &HandshakeParams) -> Result<SessionId, ConnectionError> {
        let metadata = SessionMetadata {
            target: params.ip.clone(),
            role: params.role.clone(),
            peer_addr: self.peer,
        };
        self.create(params.size(self.settings.default_size), metadata)
            .await
    }

    /// Handles one inbound text message. Malformed frames are logged and
    /// dropped.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), ConnectionError> {
        match self.codec.decode(text) {
            Ok(frame) => self.handle_frame(frame).await,
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Dropping malformed frame");
                Ok(())
            }
        }
    }

    /// Dispatches a decoded frame.
    ///
    /// Only a dead writer is reported as an error; everything else is
    /// logged and the frame dropped.
    pub async fn handle_frame(&mut self, frame: ClientFrame) -> Result<(), ConnectionError> {
        debug!(connection_id = %self.id, kind = frame.kind(), "Handling frame");

        let result = match frame {
            ClientFrame::Open { size } => {
                let metadata = self.primary_metadata();
                self.create(size.unwrap_or(self.settings.default_size), metadata)
                    .await
                    .map(|_| ())
            }
            ClientFrame::Attach { terminal_id } => self.attach(&terminal_id).await,
            ClientFrame::Close { terminal_id } => self.close(&terminal_id).await,
            ClientFrame::Resize { terminal_id, size } => {
                if let Some(handle) = self.resolve(terminal_id.as_deref()) {
                    handle.touch();
                    handle.lock().await.resize(size);
                }
                Ok(())
            }
            ClientFrame::Input { terminal_id, data } => {
                match self.resolve(terminal_id.as_deref()) {
                    Some(handle) => self.input(handle, &data).await,
                    None => Ok(()),
                }
            }
            ClientFrame::Heartbeat { terminal_id } => match self.resolve(terminal_id.as_deref()) {
                Some(handle) => {
                    handle.touch();
                    self.send(ServerFrame::Pong {
                        terminal_id: handle.id().to_string(),
                    })
                    .await
                }
                None => Ok(()),
            },
        };

        match result {
            Err(ConnectionError::Transport(e)) => Err(ConnectionError::Transport(e)),
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Frame rejected");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Handles an out-of-band event. Returns `false` when the connection
    /// has no sessions left and should close.
    pub async fn handle_event(&mut self, event: ConnectionEvent) -> Result<bool, ConnectionError> {
        match event {
            ConnectionEvent::SessionClosed { session_id, reason } => {
                if self.forget(&session_id) {
                    info!(
                        connection_id = %self.id,
                        session_id = %session_id,
                        reason = %reason,
                        "Session closed remotely"
                    );
                    self.send(ServerFrame::Closed {
                        terminal_id: session_id,
                        reason,
                    })
                    .await?;
                }
            }
        }

        Ok(!self.sessions.is_empty())
    }

    /// Applies the disconnect policy to every session still attached here.
    pub fn shutdown(&mut self) {
        for id in std::mem::take(&mut self.sessions) {
            let Ok(handle) = self.registry.get(&id) else {
                continue;
            };
            if !handle.detach_if(&self.id) {
                continue;
            }

            match self.settings.on_disconnect {
                DisconnectPolicy::Destroy => {
                    self.registry.remove(&id, CONNECTION_CLOSED);
                }
                DisconnectPolicy::Detach => {
                    info!(connection_id = %self.id, session_id = %id, "Session detached");
                }
            }
        }
    }

    async fn create(
        &mut self,
        size: TerminalSize,
        metadata: SessionMetadata,
    ) -> Result<SessionId, ConnectionError> {
        let id = self.registry.create(size, metadata)?;
        let handle = self.registry.get(&id)?;
        handle.attach(self.transport())?;
        self.sessions.push(id.clone());

        info!(connection_id = %self.id, session_id = %id, "Session opened");
        self.greet(&handle, size).await?;
        Ok(id)
    }

    async fn attach(&mut self, id: &str) -> Result<(), ConnectionError> {
        if self.settings.on_disconnect == DisconnectPolicy::Destroy {
            return Err(ConnectionError::ReattachDisabled(id.to_string()));
        }

        let handle = self.registry.get(id)?;
        let previous = handle.attach(self.transport())?;
        handle.touch();

        if let Some(previous) = previous {
            if previous.connection_id() != self.id {
                previous.close(id, TAKEN_OVER);
            }
        }

        if !self.sessions.iter().any(|s| s == id) {
            self.sessions.push(id.to_string());
        }

        info!(connection_id = %self.id, session_id = %id, "Session attached");
        let size = handle.lock().await.size();
        self.greet(&handle, size).await
    }

    async fn close(&mut self, id: &str) -> Result<(), ConnectionError> {
        if !self.forget(id) {
            return Err(SessionError::NotAttached(id.to_string()).into());
        }

        if let Ok(handle) = self.registry.get(id) {
            handle.detach_if(&self.id);
        }
        self.registry.remove(id, CLOSED_BY_CLIENT);

        self.send(ServerFrame::Closed {
            terminal_id: id.to_string(),
            reason: CLOSED_BY_CLIENT.to_string(),
        })
        .await
    }

    async fn input(&self, handle: Arc<SessionHandle>, data: &str) -> Result<(), ConnectionError> {
        handle.touch();

        let chunks = {
            let mut terminal = handle.lock().await;
            terminal.handle_input(data).await
        };

        // The session may have been reaped or taken over mid-command.
        if !handle.is_attached_to(&self.id) {
            debug!(session_id = %handle.id(), "Discarding output for detached session");
            return Ok(());
        }

        for chunk in chunks {
            self.send(ServerFrame::output(handle.id(), chunk)).await?;
        }
        Ok(())
    }

    async fn greet(&self, handle: &SessionHandle, size: TerminalSize) -> Result<(), ConnectionError> {
        self.send(ServerFrame::Init {
            terminal_id: handle.id().to_string(),
            cols: size.cols,
            rows: size.rows,
        })
        .await?;

        let prompt = handle.lock().await.prompt().to_string();
        self.send(ServerFrame::output(handle.id(), prompt)).await
    }

    /// Finds the addressed session if this connection may route to it.
    fn resolve(&self, terminal_id: Option<&str>) -> Option<Arc<SessionHandle>> {
        let id = terminal_id.or_else(|| self.primary())?;

        if !self.sessions.iter().any(|s| s == id) {
            debug!(connection_id = %self.id, session_id = %id, "Dropping frame for foreign session");
            return None;
        }

        self.registry
            .get(id)
            .ok()
            .filter(|handle| handle.is_attached_to(&self.id))
    }

    fn forget(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s != id);
        self.sessions.len() != before
    }

    fn primary_metadata(&self) -> SessionMetadata {
        self.primary()
            .and_then(|id| self.registry.get(id).ok())
            .map(|handle| handle.metadata().clone())
            .unwrap_or_else(|| SessionMetadata {
                peer_addr: self.peer,
                ..Default::default()
            })
    }

    fn transport(&self) -> TransportHandle {
        TransportHandle::new(self.id.clone(), self.events_tx.clone())
    }

    async fn send(&self, frame: ServerFrame) -> Result<(), ConnectionError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ConnectionError::Transport("writer closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CannedExecutor;
    use crate::session::RegistrySettings;

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(CannedExecutor::new()),
            RegistrySettings::default(),
        ))
    }

    fn settings(on_disconnect: DisconnectPolicy) -> ConnectionSettings {
        ConnectionSettings {
            on_disconnect,
            ..Default::default()
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn outputs(frames: &[ServerFrame]) -> String {
        frames
            .iter()
            .filter_map(|frame| match frame {
                ServerFrame::Output { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_open_sends_init_then_prompt() {
        let registry = registry();
        let (mut conn, mut rx, _events) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);

        let params = HandshakeParams {
            ip: Some("10.0.0.5".to_string()),
            role: Some("admin".to_string()),
            rows: Some("30".to_string()),
            cols: Some("100".to_string()),
            terminal_id: None,
        };
        let id = conn.open(&params).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                ServerFrame::Init {
                    terminal_id: id.clone(),
                    cols: 100,
                    rows: 30,
                },
                ServerFrame::output(id.clone(), "$ "),
            ]
        );
        let handle = registry.get(&id).unwrap();
        assert_eq!(handle.metadata().target.as_deref(), Some("10.0.0.5"));
        assert!(handle.is_attached_to(conn.id()));
    }

    #[tokio::test]
    async fn test_open_defaults_bad_dimensions() {
        let (mut conn, mut rx, _events) =
            ConnectionHandler::new(registry(), ConnectionSettings::default(), None);

        let params = HandshakeParams {
            rows: Some("abc".to_string()),
            ..Default::default()
        };
        conn.open(&params).await.unwrap();

        match &drain(&mut rx)[0] {
            ServerFrame::Init { cols, rows, .. } => assert_eq!((*cols, *rows), (80, 24)),
            other => panic!("Expected init, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_input_round_trip() {
        let (mut conn, mut rx, _events) =
            ConnectionHandler::new(registry(), ConnectionSettings::default(), None);
        let id = conn.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut rx);

        for ch in ["e", "c", "h", "o", " ", "h", "i", "\r"] {
            let text = serde_json::json!({ "type": 2, "msg": ch }).to_string();
            conn.handle_text(&text).await.unwrap();
        }

        let frames = drain(&mut rx);
        assert!(frames.iter().all(|f| f.terminal_id() == id));
        assert_eq!(outputs(&frames), "echo hi\r\nhi\r\n$ ");
    }

    #[tokio::test]
    async fn test_heartbeat_answers_pong_and_touches() {
        let registry = registry();
        let (mut conn, mut rx, _events) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let id = conn.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut rx);

        let handle = registry.get(&id).unwrap();
        let before = handle.last_active();
        conn.handle_text(r#"{"type":3}"#).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![ServerFrame::Pong {
                terminal_id: id.clone()
            }]
        );
        assert!(handle.last_active() >= before);
    }

    #[tokio::test]
    async fn test_resize_updates_session_silently() {
        let registry = registry();
        let (mut conn, mut rx, _events) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let id = conn.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut rx);

        conn.handle_text(r#"{"type":"1","cols":120,"rows":40}"#)
            .await
            .unwrap();

        assert!(drain(&mut rx).is_empty());
        let size = registry.get(&id).unwrap().lock().await.size();
        assert_eq!(size, TerminalSize::new(120, 40));
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (mut conn, mut rx, _events) =
            ConnectionHandler::new(registry(), ConnectionSettings::default(), None);
        conn.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut rx);

        conn.handle_text("not json").await.unwrap();
        conn.handle_text(r#"{"type":9}"#).await.unwrap();
        conn.handle_text(r#"{"type":2}"#).await.unwrap();

        assert!(drain(&mut rx).is_empty());
        assert_eq!(conn.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_session_frames_dropped() {
        let registry = registry();
        let (mut alice, mut alice_rx, _a) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let (mut bob, mut bob_rx, _b) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);

        let alice_id = alice.open(&HandshakeParams::default()).await.unwrap();
        bob.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let frame = ClientFrame::Input {
            terminal_id: Some(alice_id.clone()),
            data: "x".to_string(),
        };
        bob.handle_frame(frame).await.unwrap();

        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut bob_rx).is_empty());
        assert_eq!(registry.get(&alice_id).unwrap().lock().await.input(), "");
    }

    #[tokio::test]
    async fn test_open_frame_multiplexes_second_session() {
        let registry = registry();
        let (mut conn, mut rx, _events) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let first = conn.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut rx);

        conn.handle_text(r#"{"type":"open","cols":90,"rows":20}"#)
            .await
            .unwrap();
        let frames = drain(&mut rx);
        let second = match &frames[0] {
            ServerFrame::Init { terminal_id, cols, rows } => {
                assert_eq!((*cols, *rows), (90, 20));
                terminal_id.clone()
            }
            other => panic!("Expected init, got {:?}", other),
        };
        assert_ne!(first, second);
        assert_eq!(conn.sessions(), &[first.clone(), second.clone()]);
        assert_eq!(registry.len(), 2);

        let frame = ClientFrame::Input {
            terminal_id: Some(second.clone()),
            data: "z".to_string(),
        };
        conn.handle_frame(frame).await.unwrap();
        assert_eq!(drain(&mut rx), vec![ServerFrame::output(second.clone(), "z")]);

        // Untargeted input still goes to the primary.
        conn.handle_text(r#"{"type":2,"msg":"a"}"#).await.unwrap();
        assert_eq!(drain(&mut rx), vec![ServerFrame::output(first, "a")]);
    }

    #[tokio::test]
    async fn test_close_frame_destroys_session() {
        let registry = registry();
        let (mut conn, mut rx, mut events) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let id = conn.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut rx);

        let frame = ClientFrame::Close {
            terminal_id: id.clone(),
        };
        conn.handle_frame(frame).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![ServerFrame::Closed {
                terminal_id: id.clone(),
                reason: CLOSED_BY_CLIENT.to_string(),
            }]
        );
        assert!(registry.get(&id).is_err());
        assert!(conn.sessions().is_empty());
        // No duplicate notification through the event channel.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_foreign_session_ignored() {
        let registry = registry();
        let (mut alice, _alice_rx, _a) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let (mut bob, mut bob_rx, _b) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let alice_id = alice.open(&HandshakeParams::default()).await.unwrap();

        let frame = ClientFrame::Close {
            terminal_id: alice_id.clone(),
        };
        bob.handle_frame(frame).await.unwrap();

        assert!(registry.get(&alice_id).is_ok());
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_destroy_policy_removes_sessions() {
        let registry = registry();
        let (mut conn, _rx, _events) =
            ConnectionHandler::new(registry.clone(), settings(DisconnectPolicy::Destroy), None);
        conn.open(&HandshakeParams::default()).await.unwrap();
        conn.handle_frame(ClientFrame::Open { size: None }).await.unwrap();
        assert_eq!(registry.len(), 2);

        conn.shutdown();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_detach_policy_allows_reattach() {
        let registry = registry();
        let (mut first, _rx1, _e1) =
            ConnectionHandler::new(registry.clone(), settings(DisconnectPolicy::Detach), None);
        let id = first.open(&HandshakeParams::default()).await.unwrap();
        first
            .handle_text(r#"{"type":2,"msg":"p"}"#)
            .await
            .unwrap();
        first.shutdown();

        let handle = registry.get(&id).unwrap();
        assert!(!handle.is_attached());

        let (mut second, mut rx2, _e2) =
            ConnectionHandler::new(registry.clone(), settings(DisconnectPolicy::Detach), None);
        let params = HandshakeParams {
            terminal_id: Some(id.clone()),
            ..Default::default()
        };
        assert_eq!(second.open(&params).await.unwrap(), id);
        assert!(matches!(drain(&mut rx2)[0], ServerFrame::Init { .. }));

        // Pending input survived the detach.
        second
            .handle_text(r#"{"type":2,"msg":"\r"}"#)
            .await
            .unwrap();
        assert!(outputs(&drain(&mut rx2)).contains("p: command not found"));
    }

    #[tokio::test]
    async fn test_reattach_unknown_id_creates_new_session() {
        let registry = registry();
        let (mut conn, _rx, _events) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let params = HandshakeParams {
            terminal_id: Some("does-not-exist".to_string()),
            ..Default::default()
        };

        let id = conn.open(&params).await.unwrap();
        assert_ne!(id, "does-not-exist");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_policy_ignores_reattach_id() {
        let registry = registry();
        let (mut owner, mut owner_rx, mut owner_events) =
            ConnectionHandler::new(registry.clone(), settings(DisconnectPolicy::Destroy), None);
        let (mut other, _other_rx, _other_events) =
            ConnectionHandler::new(registry.clone(), settings(DisconnectPolicy::Destroy), None);

        let id = owner.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut owner_rx);

        let params = HandshakeParams {
            terminal_id: Some(id.clone()),
            ..Default::default()
        };
        let fresh = other.open(&params).await.unwrap();

        assert_ne!(fresh, id);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&id).unwrap().is_attached_to(owner.id()));
        assert!(owner_events.try_recv().is_err());
        assert!(drain(&mut owner_rx).is_empty());
    }

    #[tokio::test]
    async fn test_destroy_policy_drops_attach_frame() {
        let registry = registry();
        let (mut owner, _owner_rx, mut owner_events) =
            ConnectionHandler::new(registry.clone(), settings(DisconnectPolicy::Destroy), None);
        let (mut other, mut other_rx, _other_events) =
            ConnectionHandler::new(registry.clone(), settings(DisconnectPolicy::Destroy), None);

        let id = owner.open(&HandshakeParams::default()).await.unwrap();
        other.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut other_rx);

        other
            .handle_frame(ClientFrame::Attach {
                terminal_id: id.clone(),
            })
            .await
            .unwrap();

        assert!(drain(&mut other_rx).is_empty());
        assert_eq!(other.sessions().len(), 1);
        assert!(registry.get(&id).unwrap().is_attached_to(owner.id()));
        assert!(owner_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ls_scenario_leaves_buffer_empty() {
        let registry = registry();
        let (mut conn, mut rx, _events) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let id = conn.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut rx);

        for ch in ["l", "s", "\r"] {
            let frame = ClientFrame::Input {
                terminal_id: Some(id.clone()),
                data: ch.to_string(),
            };
            conn.handle_frame(frame).await.unwrap();
        }

        let frames = drain(&mut rx);
        let contents: Vec<&str> = frames
            .iter()
            .map(|frame| match frame {
                ServerFrame::Output { content, .. } => content.as_str(),
                other => panic!("Expected output, got {:?}", other),
            })
            .collect();
        assert_eq!(contents.len(), 5);
        assert_eq!(&contents[..3], &["l", "s", "\r\n"]);
        assert!(contents[3].contains("package.json"));
        assert!(contents[3].ends_with("\r\n"));
        assert_eq!(contents[4], "$ ");

        let handle = registry.get(&id).unwrap();
        let terminal = handle.lock().await;
        assert_eq!(terminal.input(), "");
        assert_eq!(terminal.state(), crate::session::InputState::Idle);
    }

    #[tokio::test]
    async fn test_attach_takes_over_from_other_connection() {
        let registry = registry();
        let (mut old, mut old_rx, mut old_events) =
            ConnectionHandler::new(registry.clone(), settings(DisconnectPolicy::Detach), None);
        let (mut new, mut new_rx, _new_events) =
            ConnectionHandler::new(registry.clone(), settings(DisconnectPolicy::Detach), None);

        let id = old.open(&HandshakeParams::default()).await.unwrap();
        new.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut old_rx);
        drain(&mut new_rx);

        new.handle_frame(ClientFrame::Attach {
            terminal_id: id.clone(),
        })
        .await
        .unwrap();
        assert!(matches!(drain(&mut new_rx)[0], ServerFrame::Init { .. }));

        let event = old_events.try_recv().unwrap();
        let still_open = old.handle_event(event).await.unwrap();
        assert!(!still_open);
        assert_eq!(
            drain(&mut old_rx),
            vec![ServerFrame::Closed {
                terminal_id: id.clone(),
                reason: TAKEN_OVER.to_string(),
            }]
        );

        // The old connection closing must not destroy the taken-over session.
        old.shutdown();
        assert!(registry.get(&id).unwrap().is_attached_to(new.id()));
    }

    #[tokio::test]
    async fn test_reaped_session_notifies_connection() {
        let registry = registry();
        let (mut conn, mut rx, mut events) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let id = conn.open(&HandshakeParams::default()).await.unwrap();
        drain(&mut rx);

        registry.remove(&id, "idle timeout");

        let event = events.try_recv().unwrap();
        assert!(!conn.handle_event(event).await.unwrap());
        assert_eq!(
            drain(&mut rx),
            vec![ServerFrame::Closed {
                terminal_id: id.clone(),
                reason: "idle timeout".to_string(),
            }]
        );

        conn.handle_text(r#"{"type":2,"msg":"x"}"#).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_open_fails_at_session_limit() {
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(CannedExecutor::new()),
            RegistrySettings {
                max_sessions: 1,
                ..Default::default()
            },
        ));
        let (mut first, _rx1, _e1) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);
        let (mut second, _rx2, _e2) =
            ConnectionHandler::new(registry.clone(), ConnectionSettings::default(), None);

        first.open(&HandshakeParams::default()).await.unwrap();
        let err = second.open(&HandshakeParams::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Session(SessionError::LimitReached(1))
        ));
    }

    #[tokio::test]
    async fn test_writer_gone_is_transport_error() {
        let (mut conn, rx, _events) =
            ConnectionHandler::new(registry(), ConnectionSettings::default(), None);
        drop(rx);

        let err = conn.open(&HandshakeParams::default()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Transport(_)));
    }
}
