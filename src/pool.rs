//! Connection pool — long-lived upstream links with health tracking and
//! automatic recovery.
//!
//! The pool maintains at most one persistent link per socket agent. It does
//! not carry per-invocation traffic (the socket adapter opens a dedicated
//! session per call to keep conversations isolated); its value is liveness
//! tracking, fast failure detection, and a reuse point.
//!
//! Per-entry state machine:
//!
//! ```text
//!            connect attempt
//!     [start] ──────────────► CONNECTING
//!                               │ success        │ failure
//!                               ▼                ▼ (auth → DEAD, else → removed)
//!                             IDLE  ◄─last session ended─  ACTIVE
//!                               │                ▲
//!                       idle timer fires         │ session started
//!                               ▼                │
//!                          [removed]            RECONNECTING ──max attempts──► DEAD
//!                                                 ▲
//!                                      disconnect/error from IDLE or ACTIVE
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AgentDescriptor;

/// Capacity of the pool notice channel.
const NOTICE_CAPACITY: usize = 64;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial connect in flight.
    Connecting,
    /// Link up, no active sessions.
    Idle,
    /// Link up, at least one active session.
    Active,
    /// Link lost, backoff retry in flight.
    Reconnecting,
    /// Link unrecoverable; the entry has left the pool.
    Dead,
}

/// Event reported by a live link.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The link closed.
    Disconnected,
    /// The link failed with an error message.
    Errored {
        /// The failure text (inspected for the auth fast path).
        message: String,
    },
}

/// Notification broadcast by the pool.
#[derive(Debug, Clone)]
pub enum PoolNotice {
    /// An entry became unrecoverable and was removed.
    Dead {
        /// The agent whose link died.
        agent_id: String,
    },
}

/// Pool failure kinds.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    /// The upstream could not be reached.
    #[error("failed to connect upstream: {message}")]
    ConnectFailed {
        /// The connect failure text.
        message: String,
    },

    /// The agent's entry is dead; invocations must fail fast.
    #[error("upstream connection for agent '{agent_id}' is dead")]
    Dead {
        /// The agent with the dead entry.
        agent_id: String,
    },
}

/// A live link to an upstream endpoint, owned exclusively by the pool.
#[async_trait]
pub trait PersistentLink: Send + Sync {
    /// Wait for the link's next lifecycle event (disconnect or error).
    async fn next_event(&mut self) -> LinkEvent;

    /// Close the link.
    async fn close(&mut self);
}

/// Opens persistent links; injected so tests can drive the state machine
/// without sockets.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Establish a link to the agent's endpoint.
    async fn connect(&self, agent: &AgentDescriptor) -> Result<Box<dyn PersistentLink>, PoolError>;
}

/// Timing and retry policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long an idle entry lives before eviction.
    pub idle_timeout: Duration,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base: Duration,
    /// Reconnect delay ceiling.
    pub reconnect_cap: Duration,
    /// Failed reconnect attempts before the entry goes dead.
    pub max_attempts: u32,
    /// Uniform jitter fraction applied to each delay.
    pub jitter: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
            max_attempts: 6,
            jitter: 0.2,
        }
    }
}

/// `min(base · 2^(attempt-1), cap)` adjusted by uniform ±jitter.
pub fn backoff_delay(attempt: u32, config: &PoolConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let raw = config.reconnect_base.as_secs_f64() * f64::from(1u32 << exponent);
    let capped = raw.min(config.reconnect_cap.as_secs_f64());
    let factor = 1.0 + config.jitter * (rand::thread_rng().gen::<f64>() * 2.0 - 1.0);
    Duration::from_secs_f64((capped * factor).max(0.0))
}

/// Whether an error message marks an authentication failure — those go
/// straight to dead, no retry.
pub fn is_auth_error(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    ["401", "403", "unauthorized", "forbidden"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

struct PoolEntry {
    agent: AgentDescriptor,
    state: ConnectionState,
    active_sessions: u32,
    last_activity: Instant,
    reconnect_attempts: u32,
    idle_timer: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
    close_link: Option<oneshot::Sender<()>>,
}

impl PoolEntry {
    fn new(agent: AgentDescriptor) -> Self {
        Self {
            agent,
            state: ConnectionState::Connecting,
            active_sessions: 0,
            last_activity: Instant::now(),
            reconnect_attempts: 0,
            idle_timer: None,
            watcher: None,
            close_link: None,
        }
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }

    fn teardown(&mut self) {
        self.cancel_idle_timer();
        if let Some(close) = self.close_link.take() {
            let _ = close.send(());
        }
        self.watcher = None;
    }
}

/// The pool. One per process; entries are keyed by agent id.
pub struct ConnectionPool {
    connector: Arc<dyn UpstreamConnector>,
    config: PoolConfig,
    entries: Mutex<HashMap<String, Arc<Mutex<PoolEntry>>>>,
    notices: broadcast::Sender<PoolNotice>,
}

impl ConnectionPool {
    /// Create a pool over the given connector with the default policy.
    pub fn new(connector: Arc<dyn UpstreamConnector>) -> Self {
        Self::with_config(connector, PoolConfig::default())
    }

    /// Create a pool with an explicit policy (tests shorten the timers).
    pub fn with_config(connector: Arc<dyn UpstreamConnector>, config: PoolConfig) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            connector,
            config,
            entries: Mutex::new(HashMap::new()),
            notices,
        }
    }

    /// Subscribe to pool notices (dead entries).
    pub fn subscribe(&self) -> broadcast::Receiver<PoolNotice> {
        self.notices.subscribe()
    }

    /// Ensure an entry exists for the agent, connecting if needed, and
    /// return its current state.
    ///
    /// Fails fast when the entry is dead or the initial connect fails
    /// (auth-flagged connect failures also mark the entry dead).
    pub async fn get_or_create(
        self: &Arc<Self>,
        agent: &AgentDescriptor,
    ) -> Result<ConnectionState, PoolError> {
        // Fast path: existing entry.
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(&agent.id) {
                let mut entry = entry.lock().await;
                if entry.state == ConnectionState::Dead {
                    return Err(PoolError::Dead {
                        agent_id: agent.id.clone(),
                    });
                }
                entry.last_activity = Instant::now();
                return Ok(entry.state);
            }
        }

        // Slow path: admit a connecting entry, then dial without any lock.
        let entry = Arc::new(Mutex::new(PoolEntry::new(agent.clone())));
        {
            let mut entries = self.entries.lock().await;
            // A racing call may have admitted the agent meanwhile.
            if let Some(existing) = entries.get(&agent.id) {
                let existing = existing.lock().await;
                if existing.state == ConnectionState::Dead {
                    return Err(PoolError::Dead {
                        agent_id: agent.id.clone(),
                    });
                }
                return Ok(existing.state);
            }
            entries.insert(agent.id.clone(), Arc::clone(&entry));
        }

        match self.connector.connect(agent).await {
            Ok(link) => {
                let mut guard = entry.lock().await;
                guard.state = ConnectionState::Idle;
                guard.reconnect_attempts = 0;
                self.attach_link(&mut guard, &agent.id, link);
                self.start_idle_timer(&mut guard, &agent.id);
                info!(agent_id = %agent.id, "pool entry connected");
                Ok(ConnectionState::Idle)
            }
            Err(error) => {
                if is_auth_error(&error.to_string()) {
                    self.transition_dead(&agent.id, &error.to_string()).await;
                    Err(PoolError::Dead {
                        agent_id: agent.id.clone(),
                    })
                } else {
                    self.entries.lock().await.remove(&agent.id);
                    Err(error)
                }
            }
        }
    }

    /// Record that an invocation against the agent began.
    pub async fn session_started(&self, agent_id: &str) {
        let Some(entry) = self.entry(agent_id).await else {
            warn!(agent_id, "session started for agent not in pool");
            return;
        };
        let mut entry = entry.lock().await;
        entry.active_sessions += 1;
        entry.last_activity = Instant::now();
        entry.cancel_idle_timer();
        if entry.state == ConnectionState::Idle {
            entry.state = ConnectionState::Active;
        }
        debug!(agent_id, sessions = entry.active_sessions, "pool session started");
    }

    /// Record that an invocation against the agent finished.
    pub async fn session_ended(self: &Arc<Self>, agent_id: &str) {
        let Some(entry) = self.entry(agent_id).await else {
            return;
        };
        let mut entry = entry.lock().await;
        entry.active_sessions = entry.active_sessions.saturating_sub(1);
        entry.last_activity = Instant::now();
        if entry.active_sessions == 0 && entry.state == ConnectionState::Active {
            entry.state = ConnectionState::Idle;
            self.start_idle_timer(&mut entry, agent_id);
        }
        debug!(agent_id, sessions = entry.active_sessions, "pool session ended");
    }

    /// Disconnect and drop the agent's entry.
    pub async fn remove(&self, agent_id: &str) {
        let removed = self.entries.lock().await.remove(agent_id);
        if let Some(entry) = removed {
            entry.lock().await.teardown();
            debug!(agent_id, "pool entry removed");
        }
    }

    /// Current state of the agent's entry, if pooled.
    pub async fn state_of(&self, agent_id: &str) -> Option<ConnectionState> {
        let entry = self.entry(agent_id).await?;
        let entry = entry.lock().await;
        Some(entry.state)
    }

    /// Active session count of the agent's entry, if pooled.
    pub async fn active_sessions(&self, agent_id: &str) -> Option<u32> {
        let entry = self.entry(agent_id).await?;
        let entry = entry.lock().await;
        Some(entry.active_sessions)
    }

    /// Whether the agent has a pooled entry.
    pub async fn contains(&self, agent_id: &str) -> bool {
        self.entries.lock().await.contains_key(agent_id)
    }

    /// Number of pooled entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the pool is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Test-only reset: tear down and drop every entry.
    pub async fn clear(&self) {
        let drained: Vec<_> = self.entries.lock().await.drain().collect();
        for (_, entry) in drained {
            entry.lock().await.teardown();
        }
    }

    async fn entry(&self, agent_id: &str) -> Option<Arc<Mutex<PoolEntry>>> {
        self.entries.lock().await.get(agent_id).cloned()
    }

    /// Hand a fresh link to a watcher task that reports its failure.
    fn attach_link(self: &Arc<Self>, entry: &mut PoolEntry, agent_id: &str, link: Box<dyn PersistentLink>) {
        let (close_tx, close_rx) = oneshot::channel();
        entry.close_link = Some(close_tx);

        let pool = Arc::clone(self);
        let agent_id = agent_id.to_string();
        entry.watcher = Some(tokio::spawn(async move {
            let mut link = link;
            tokio::select! {
                event = link.next_event() => {
                    pool.handle_link_event(&agent_id, event).await;
                }
                _ = close_rx => {
                    link.close().await;
                }
            }
        }));
    }

    fn start_idle_timer(self: &Arc<Self>, entry: &mut PoolEntry, agent_id: &str) {
        entry.cancel_idle_timer();
        let pool = Arc::clone(self);
        let agent_id = agent_id.to_string();
        let timeout = self.config.idle_timeout;
        entry.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            pool.evict_if_idle(&agent_id).await;
        }));
    }

    async fn evict_if_idle(&self, agent_id: &str) {
        let Some(entry) = self.entry(agent_id).await else {
            return;
        };
        {
            let entry = entry.lock().await;
            if entry.state != ConnectionState::Idle || entry.active_sessions > 0 {
                return;
            }
            info!(
                agent_id,
                idle_for = ?entry.last_activity.elapsed(),
                "evicting idle pool entry"
            );
        }
        self.remove(agent_id).await;
    }

    async fn handle_link_event(self: &Arc<Self>, agent_id: &str, event: LinkEvent) {
        let message = match &event {
            LinkEvent::Disconnected => "connection closed".to_string(),
            LinkEvent::Errored { message } => message.clone(),
        };
        warn!(agent_id, %message, "pool link lost");

        if is_auth_error(&message) {
            self.transition_dead(agent_id, &message).await;
            return;
        }

        let Some(entry) = self.entry(agent_id).await else {
            return;
        };
        {
            let mut entry = entry.lock().await;
            match entry.state {
                ConnectionState::Idle | ConnectionState::Active => {
                    entry.state = ConnectionState::Reconnecting;
                    entry.cancel_idle_timer();
                }
                // Already reconnecting or dead — nothing to schedule.
                _ => return,
            }
        }
        self.spawn_reconnect(agent_id.to_string());
    }

    fn spawn_reconnect(self: &Arc<Self>, agent_id: String) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.reconnect_loop(&agent_id).await;
        });
    }

    async fn reconnect_loop(self: Arc<Self>, agent_id: &str) {
        loop {
            let Some(entry) = self.entry(agent_id).await else {
                return;
            };
            let (agent, attempt) = {
                let entry = entry.lock().await;
                if entry.state != ConnectionState::Reconnecting {
                    return;
                }
                (entry.agent.clone(), entry.reconnect_attempts + 1)
            };

            let delay = backoff_delay(attempt, &self.config);
            debug!(agent_id, attempt, ?delay, "scheduling reconnect");
            tokio::time::sleep(delay).await;

            match self.connector.connect(&agent).await {
                Ok(link) => {
                    let mut entry = entry.lock().await;
                    if entry.state != ConnectionState::Reconnecting {
                        return;
                    }
                    entry.reconnect_attempts = 0;
                    entry.state = if entry.active_sessions > 0 {
                        ConnectionState::Active
                    } else {
                        ConnectionState::Idle
                    };
                    self.attach_link(&mut entry, agent_id, link);
                    if entry.state == ConnectionState::Idle {
                        self.start_idle_timer(&mut entry, agent_id);
                    }
                    info!(agent_id, "pool link reconnected");
                    return;
                }
                Err(error) => {
                    let message = error.to_string();
                    if is_auth_error(&message) {
                        self.transition_dead(agent_id, &message).await;
                        return;
                    }
                    let exhausted = {
                        let mut entry = entry.lock().await;
                        entry.reconnect_attempts = attempt;
                        attempt >= self.config.max_attempts
                    };
                    warn!(agent_id, attempt, %message, "reconnect attempt failed");
                    if exhausted {
                        self.transition_dead(agent_id, "reconnect attempts exhausted")
                            .await;
                        return;
                    }
                }
            }
        }
    }

    /// Dead entries leave the pool immediately: clear timers, close the
    /// link, notify subscribers.
    async fn transition_dead(&self, agent_id: &str, reason: &str) {
        warn!(agent_id, reason, "pool entry is dead");
        let removed = self.entries.lock().await.remove(agent_id);
        if let Some(entry) = removed {
            let mut entry = entry.lock().await;
            entry.state = ConnectionState::Dead;
            entry.teardown();
        }
        let _ = self.notices.send(PoolNotice::Dead {
            agent_id: agent_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_match_case_insensitively() {
        assert!(is_auth_error("HTTP 401 returned"));
        assert!(is_auth_error("Forbidden"));
        assert!(is_auth_error("user is UNAUTHORIZED"));
        assert!(!is_auth_error("connection reset by peer"));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = PoolConfig {
            jitter: 0.0,
            ..PoolConfig::default()
        };
        assert_eq!(backoff_delay(1, &config), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, &config), Duration::from_secs(2));
        assert_eq!(backoff_delay(5, &config), Duration::from_secs(16));
        // 2^(7-1) = 64s, capped at 30s.
        assert_eq!(backoff_delay(7, &config), Duration::from_secs(30));
    }

    #[test]
    fn backoff_jitter_stays_in_band() {
        let config = PoolConfig::default();
        for _ in 0..200 {
            let delay = backoff_delay(3, &config).as_secs_f64();
            // 4s ± 20%.
            assert!((3.2..=4.8).contains(&delay), "delay {} out of band", delay);
        }
    }
}
