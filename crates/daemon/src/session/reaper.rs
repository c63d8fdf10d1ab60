//! Background eviction of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::SessionRegistry;
use super::{now_millis, SessionId};

/// Reason reported to clients whose session was reaped.
pub const IDLE_REASON: &str = "idle timeout";

/// Periodically removes sessions idle longer than the timeout.
#[derive(Clone)]
pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    interval: Duration,
}

impl IdleReaper {
    pub fn new(registry: Arc<SessionRegistry>, idle_timeout: Duration, interval: Duration) -> Self {
        Self {
            registry,
            idle_timeout,
            interval,
        }
    }

    /// Sweeps once using the current time.
    pub fn sweep(&self) -> Vec<SessionId> {
        self.sweep_at(now_millis())
    }

    /// Sweeps once as if the clock read `now` (Unix milliseconds).
    ///
    /// A session is reaped when `now - last_active` strictly exceeds the
    /// idle timeout. Activity racing the sweep wins: the idle check and
    /// the removal happen under the same map shard lock.
    pub fn sweep_at(&self, now: u64) -> Vec<SessionId> {
        let timeout_ms = self.idle_timeout.as_millis() as u64;
        let mut reaped = Vec::new();

        for id in self.registry.ids() {
            if let Some(handle) = self.registry.remove_if_idle(&id, now, timeout_ms, IDLE_REASON) {
                tracing::info!(
                    session_id = %id,
                    idle_ms = handle.idle_for(now),
                    "Reaped idle session"
                );
                reaped.push(id);
            }
        }

        if !reaped.is_empty() {
            tracing::debug!(
                reaped = reaped.len(),
                remaining = self.registry.len(),
                "Idle sweep finished"
            );
        }

        reaped
    }

    /// Runs the sweep loop until `shutdown` is cancelled.
    ///
    /// `on_reap` is called with the ids removed by each non-empty sweep.
    pub fn spawn<F>(self, shutdown: CancellationToken, on_reap: F) -> JoinHandle<()>
    where
        F: Fn(Vec<SessionId>) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            tracing::debug!(
                interval_secs = self.interval.as_secs(),
                idle_timeout_secs = self.idle_timeout.as_secs(),
                "Idle reaper started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = self.sweep();
                        if !reaped.is_empty() {
                            on_reap(reaped);
                        }
                    }
                }
            }

            tracing::debug!("Idle reaper stopped");
        })
    }
}
