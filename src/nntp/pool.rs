//! Shared pool of authenticated NNTP sessions across all configured servers.
//!
//! Each server gets a semaphore sized to its connection budget. A permit is
//! held for as long as the session it was taken for exists, whether that
//! session sits idle in the pool or is checked out by a fetch, so the budget
//! is never exceeded. Bookkeeping sits behind a plain mutex that is never
//! held across an await.

use super::{ConnectError, Connector, NntpSession};
use crate::config::{RetryConfig, ServerConfig, StreamConfig};
use crate::error::{ArticleError, Error, Result, StreamError};
use crate::retry::with_retry;
use crate::types::{PoolStats, ServerStats};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Pool of NNTP sessions, shared by every stream in the process
pub struct ServerPool {
    slots: Vec<Arc<ServerSlot>>,
    connector: Arc<dyn Connector>,
    retry: RetryConfig,
    idle_timeout: Duration,
    auth_failure_cooldown: Duration,
    notify: Arc<Notify>,
    shutdown: CancellationToken,
}

struct ServerSlot {
    index: usize,
    config: ServerConfig,
    label: String,
    permits: Arc<Semaphore>,
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    idle: Vec<IdleSession>,
    auth_failed_at: Option<Instant>,
    sessions_opened: u64,
    sessions_discarded: u64,
}

struct IdleSession {
    conn: Box<dyn NntpSession>,
    permit: OwnedSemaphorePermit,
    since: Instant,
}

impl ServerSlot {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn in_cooldown(&self, cooldown: Duration) -> bool {
        self.state()
            .auth_failed_at
            .is_some_and(|at| at.elapsed() < cooldown)
    }

    /// Most recently used idle session that has not outlived the idle timeout
    fn take_idle(&self, idle_timeout: Duration) -> Option<(Box<dyn NntpSession>, OwnedSemaphorePermit)> {
        let mut state = self.state();
        let before = state.idle.len();
        state.idle.retain(|s| s.since.elapsed() < idle_timeout);
        let expired = before - state.idle.len();
        if expired > 0 {
            tracing::debug!(server = %self.label, expired, "closed idle sessions past idle timeout");
        }
        state.idle.pop().map(|s| (s.conn, s.permit))
    }
}

impl ServerPool {
    /// Create a pool over `servers` (priority = configuration order).
    ///
    /// No connections are opened until the first acquire.
    pub fn new(
        servers: Vec<ServerConfig>,
        connector: Arc<dyn Connector>,
        retry: RetryConfig,
        stream: &StreamConfig,
    ) -> Self {
        let slots = servers
            .into_iter()
            .enumerate()
            .map(|(index, config)| {
                Arc::new(ServerSlot {
                    index,
                    label: config.label(),
                    permits: Arc::new(Semaphore::new(config.connections)),
                    config,
                    state: Mutex::new(SlotState::default()),
                })
            })
            .collect();

        Self {
            slots,
            connector,
            retry,
            idle_timeout: stream.idle_timeout,
            auth_failure_cooldown: stream.auth_failure_cooldown,
            notify: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of configured servers
    pub fn server_count(&self) -> usize {
        self.slots.len()
    }

    /// Check out a session from the highest-priority server that can provide one
    pub async fn acquire(&self, timeout: Duration) -> Result<Session> {
        self.acquire_excluding(&HashSet::new(), timeout).await
    }

    /// Like [`acquire`](Self::acquire) but never from a server index in `excluded`.
    ///
    /// Fails with `NoServerAvailable` when no server is eligible, when every
    /// eligible server failed to open a session, when the pool is shut down, or
    /// when `timeout` elapses while waiting.
    pub async fn acquire_excluding(
        &self,
        excluded: &HashSet<usize>,
        timeout: Duration,
    ) -> Result<Session> {
        tokio::select! {
            result = tokio::time::timeout(timeout, self.acquire_inner(excluded)) => {
                result.unwrap_or_else(|_| {
                    Err(no_server(format!("timed out after {:?} waiting for a session", timeout)))
                })
            }
            _ = self.shutdown.cancelled() => Err(no_server("pool is shut down".to_string())),
        }
    }

    async fn acquire_inner(&self, excluded: &HashSet<usize>) -> Result<Session> {
        loop {
            if self.shutdown.is_cancelled() {
                return Err(no_server("pool is shut down".to_string()));
            }

            // Register interest before scanning so a release between the scan
            // and the wait is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut eligible = 0;
            let mut failures = Vec::new();

            for slot in &self.slots {
                if excluded.contains(&slot.index) || slot.in_cooldown(self.auth_failure_cooldown) {
                    continue;
                }
                eligible += 1;

                if let Some((conn, permit)) = slot.take_idle(self.idle_timeout) {
                    return Ok(self.checkout(slot, conn, permit));
                }

                let Ok(permit) = slot.permits.clone().try_acquire_owned() else {
                    continue;
                };

                match self.open(slot).await {
                    Ok(conn) => {
                        slot.state().sessions_opened += 1;
                        return Ok(self.checkout(slot, conn, permit));
                    }
                    Err(e) => {
                        drop(permit);
                        if let ConnectError::Auth(_) = e {
                            slot.state().auth_failed_at = Some(Instant::now());
                            tracing::warn!(
                                server = %slot.label,
                                cooldown_secs = self.auth_failure_cooldown.as_secs(),
                                "authentication rejected, server on cooldown"
                            );
                        }
                        failures.push(format!("{}: {}", slot.label, e));
                        self.notify.notify_waiters();
                    }
                }
            }

            if eligible == 0 {
                return Err(no_server("no eligible server".to_string()));
            }
            if failures.len() == eligible {
                return Err(no_server(failures.join("; ")));
            }

            // Every eligible server is at its budget; wait for a release
            notified.await;
        }
    }

    async fn open(&self, slot: &ServerSlot) -> std::result::Result<Box<dyn NntpSession>, ConnectError> {
        let connector = &self.connector;
        let config = &slot.config;
        with_retry(&self.retry, move || connector.connect(config)).await
    }

    fn checkout(
        &self,
        slot: &Arc<ServerSlot>,
        conn: Box<dyn NntpSession>,
        permit: OwnedSemaphorePermit,
    ) -> Session {
        Session {
            conn: Some(conn),
            permit: Some(permit),
            slot: slot.clone(),
            notify: self.notify.clone(),
        }
    }

    /// Return a healthy session for reuse
    pub fn release(&self, mut session: Session) {
        let (Some(conn), Some(permit)) = (session.conn.take(), session.permit.take()) else {
            return;
        };

        if !self.shutdown.is_cancelled() {
            session.slot.state().idle.push(IdleSession {
                conn,
                permit,
                since: Instant::now(),
            });
        }
        self.notify.notify_waiters();
    }

    /// Close a session that errored, freeing its slot in the budget
    pub fn discard(&self, session: Session) {
        // Drop does the work
        drop(session);
    }

    /// Close all idle sessions and refuse further acquires.
    ///
    /// Checked-out sessions are closed when they come back.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        for slot in &self.slots {
            let closed = std::mem::take(&mut slot.state().idle);
            if !closed.is_empty() {
                tracing::debug!(server = %slot.label, sessions = closed.len(), "closing idle sessions");
            }
        }
        self.notify.notify_waiters();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Snapshot of per-server usage
    pub fn stats(&self) -> PoolStats {
        let servers = self
            .slots
            .iter()
            .map(|slot| {
                let state = slot.state();
                let open = slot.config.connections - slot.permits.available_permits();
                ServerStats {
                    server: slot.label.clone(),
                    max_connections: slot.config.connections,
                    open,
                    idle: state.idle.len(),
                    in_use: open.saturating_sub(state.idle.len()),
                    auth_cooldown: state
                        .auth_failed_at
                        .is_some_and(|at| at.elapsed() < self.auth_failure_cooldown),
                    sessions_opened: state.sessions_opened,
                    sessions_discarded: state.sessions_discarded,
                }
            })
            .collect();

        PoolStats {
            servers,
            shut_down: self.shutdown.is_cancelled(),
        }
    }
}

fn no_server(reason: String) -> Error {
    Error::Stream(StreamError::NoServerAvailable(reason))
}

/// A session checked out of the pool.
///
/// Hand it back with [`ServerPool::release`] or [`ServerPool::discard`].
/// Dropping it without either counts as a discard.
pub struct Session {
    conn: Option<Box<dyn NntpSession>>,
    permit: Option<OwnedSemaphorePermit>,
    slot: Arc<ServerSlot>,
    notify: Arc<Notify>,
}

impl Session {
    /// Index of the server (configuration order) this session belongs to
    pub fn server_index(&self) -> usize {
        self.slot.index
    }

    /// `host:port` of the server this session belongs to
    pub fn server(&self) -> &str {
        &self.slot.label
    }

    /// Retrieve the raw body of an article (`message_id` in bracketed form)
    pub async fn fetch_article(&mut self, message_id: &str) -> std::result::Result<Vec<u8>, ArticleError> {
        match self.conn.as_mut() {
            Some(conn) => conn.fetch_article(message_id).await,
            None => Err(ArticleError::Transfer {
                message_id: message_id.to_string(),
                reason: "session already closed".to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.slot.label)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            self.slot.state().sessions_discarded += 1;
            tracing::debug!(server = %self.slot.label, "session discarded");
            self.permit.take();
            self.notify.notify_waiters();
        }
    }
}
