//! Shared registry of live terminal sessions.
//!
//! The registry exclusively owns session lifetime. Connection workers hold
//! `Arc<SessionHandle>` clones but must re-check attachment before using
//! one, since the reaper or another connection may have removed or taken
//! over the session in between.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use protocol::TerminalSize;
use thiserror::Error;

use super::history::{format_duration, format_timestamp, HistoryRecord, SessionHistory};
use super::reaper::IDLE_REASON;
use super::terminal::{CommandLog, SessionMetadata, TerminalSession};
use super::transport::TransportHandle;
use super::{now_millis, SessionId};
use crate::executor::CommandExecutor;

/// Errors from registry and attachment operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("session limit reached ({0} sessions)")]
    LimitReached(usize),

    #[error("session {0} is not attached to this connection")]
    NotAttached(SessionId),
}

/// A registered session: terminal state plus lifecycle bookkeeping.
pub struct SessionHandle {
    id: SessionId,
    metadata: SessionMetadata,
    created_at: u64,
    last_active: AtomicU64,
    destroyed: AtomicBool,
    commands: CommandLog,
    terminal: tokio::sync::Mutex<TerminalSession>,
    transport: Mutex<Option<TransportHandle>>,
}

impl SessionHandle {
    fn new(id: SessionId, metadata: SessionMetadata, terminal: TerminalSession) -> Self {
        let now = now_millis();
        Self {
            id,
            metadata,
            created_at: now,
            last_active: AtomicU64::new(now),
            destroyed: AtomicBool::new(false),
            commands: terminal.command_log(),
            terminal: tokio::sync::Mutex::new(terminal),
            transport: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    /// Creation time, Unix milliseconds.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Last activity, Unix milliseconds.
    pub fn last_active(&self) -> u64 {
        self.last_active.load(Ordering::Acquire)
    }

    /// Records activity now. Never moves `last_active` backwards.
    pub fn touch(&self) {
        self.touch_at(now_millis());
    }

    pub(crate) fn touch_at(&self, millis: u64) {
        self.last_active.fetch_max(millis, Ordering::AcqRel);
    }

    /// Milliseconds since the last activity, as seen at `now`.
    pub fn idle_for(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_active())
    }

    /// True once the session has been removed from the registry.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Locks the terminal state for input processing.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, TerminalSession> {
        self.terminal.lock().await
    }

    fn transport_slot(&self) -> MutexGuard<'_, Option<TransportHandle>> {
        self.transport
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attaches this session to a connection, returning the live handle it
    /// replaced, if any. A handle whose connection has already exited is
    /// discarded silently.
    pub fn attach(&self, transport: TransportHandle) -> Result<Option<TransportHandle>, SessionError> {
        let mut slot = self.transport_slot();
        if self.is_destroyed() {
            return Err(SessionError::NotFound(self.id.clone()));
        }
        Ok(slot.replace(transport).filter(|previous| !previous.is_closed()))
    }

    /// Clears the transport slot if it still points at `connection_id`.
    pub fn detach_if(&self, connection_id: &str) -> bool {
        let mut slot = self.transport_slot();
        match slot.as_ref() {
            Some(handle) if handle.connection_id() == connection_id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// True if the session is live and attached to `connection_id`.
    pub fn is_attached_to(&self, connection_id: &str) -> bool {
        !self.is_destroyed()
            && self
                .transport_slot()
                .as_ref()
                .is_some_and(|handle| handle.connection_id() == connection_id)
    }

    /// True if a connection that is still running is attached.
    pub fn is_attached(&self) -> bool {
        self.transport_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_closed())
    }

    /// Commands submitted so far, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.commands.snapshot()
    }

    fn history_record(&self, reason: &str, now: u64) -> HistoryRecord {
        HistoryRecord {
            id: self.id.clone(),
            ip: self.metadata.target.clone(),
            role: self.metadata.role.clone(),
            create_time: format_timestamp(self.created_at),
            duration: format_duration(now.saturating_sub(self.created_at)),
            status: if reason == IDLE_REASON { "timeout" } else { "completed" }.to_string(),
            commands: self.commands(),
        }
    }

    /// Kill hook: marks the session destroyed, closes its transport and
    /// clears pending input.
    fn kill(&self, reason: &str) {
        self.destroyed.store(true, Ordering::Release);

        let transport = self.transport_slot().take();
        if let Some(handle) = transport {
            handle.close(&self.id, reason);
        }

        // A worker mid-command holds the lock; it re-checks `destroyed`.
        if let Ok(mut terminal) = self.terminal.try_lock() {
            terminal.kill();
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .field("last_active", &self.last_active())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Snapshot of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub target: Option<String>,
    pub role: Option<String>,
    pub attached: bool,
    pub idle_secs: u64,
}

/// Registry limits and session defaults.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,
    /// Prompt given to new sessions.
    pub prompt: String,
    /// Destroyed sessions kept for the history endpoint.
    pub history_limit: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            prompt: super::terminal::PROMPT.to_string(),
            history_limit: 1000,
        }
    }
}

/// Concurrent map of session id to session.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    history: SessionHistory,
    executor: Arc<dyn CommandExecutor>,
    settings: RegistrySettings,
}

impl SessionRegistry {
    /// Creates an empty registry whose sessions share `executor`.
    pub fn new(executor: Arc<dyn CommandExecutor>, settings: RegistrySettings) -> Self {
        Self {
            sessions: DashMap::new(),
            history: SessionHistory::new(settings.history_limit),
            executor,
            settings,
        }
    }

    /// Creates and registers a new session.
    pub fn create(
        &self,
        size: TerminalSize,
        metadata: SessionMetadata,
    ) -> Result<SessionId, SessionError> {
        if self.sessions.len() >= self.settings.max_sessions {
            tracing::warn!(
                max_sessions = self.settings.max_sessions,
                "Refusing new session, limit reached"
            );
            return Err(SessionError::LimitReached(self.settings.max_sessions));
        }

        let target = metadata.target.clone();
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            if let Entry::Vacant(entry) = self.sessions.entry(id.clone()) {
                let terminal = TerminalSession::new(
                    id.clone(),
                    size,
                    self.settings.prompt.clone(),
                    Arc::clone(&self.executor),
                );
                entry.insert(Arc::new(SessionHandle::new(id.clone(), metadata, terminal)));

                tracing::info!(
                    session_id = %id,
                    target = target.as_deref(),
                    cols = size.cols,
                    rows = size.rows,
                    "Session created"
                );
                return Ok(id);
            }
        }
    }

    /// Looks up a session.
    pub fn get(&self, id: &str) -> Result<Arc<SessionHandle>, SessionError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Records activity on a session. Unknown ids are ignored.
    pub fn touch(&self, id: &str) {
        if let Some(entry) = self.sessions.get(id) {
            entry.value().touch();
        }
    }

    /// Destroys and evicts a session. Idempotent.
    pub fn remove(&self, id: &str, reason: &str) -> Option<Arc<SessionHandle>> {
        let (_, handle) = self.sessions.remove(id)?;
        self.destroy(&handle, reason);
        tracing::info!(session_id = %id, reason = reason, "Session removed");
        Some(handle)
    }

    /// Evicts a session only if it has been idle longer than `timeout_ms`
    /// as of `now`. The check and removal are atomic with respect to other
    /// registry operations on the same id.
    pub fn remove_if_idle(
        &self,
        id: &str,
        now: u64,
        timeout_ms: u64,
        reason: &str,
    ) -> Option<Arc<SessionHandle>> {
        let (_, handle) = self
            .sessions
            .remove_if(id, |_, handle| handle.idle_for(now) > timeout_ms)?;
        self.destroy(&handle, reason);
        Some(handle)
    }

    fn destroy(&self, handle: &SessionHandle, reason: &str) {
        handle.kill(reason);
        self.history.record(handle.history_record(reason, now_millis()));
    }

    /// Visits every session. Runs on a snapshot, so the visitor may call
    /// back into the registry.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Arc<SessionHandle>),
    {
        let snapshot: Vec<Arc<SessionHandle>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for handle in &snapshot {
            visitor(handle);
        }
    }

    /// Ids of all registered sessions.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Removes every session.
    pub fn clear(&self, reason: &str) -> usize {
        let ids = self.ids();
        ids.iter()
            .filter(|id| self.remove(id, reason).is_some())
            .count()
    }

    /// Listing snapshot.
    pub fn list(&self) -> Vec<SessionInfo> {
        let now = now_millis();
        let mut infos = Vec::with_capacity(self.sessions.len());
        self.for_each(|handle| {
            infos.push(SessionInfo {
                id: handle.id().to_string(),
                target: handle.metadata().target.clone(),
                role: handle.metadata().role.clone(),
                attached: handle.is_attached(),
                idle_secs: handle.idle_for(now) / 1000,
            });
        });
        infos
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Destroyed sessions, newest last.
    pub fn history(&self) -> &SessionHistory {
        &self.history
    }
}
