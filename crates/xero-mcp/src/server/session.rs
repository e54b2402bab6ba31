//! Session registry for the HTTP transports.
//!
//! Each session owns an independent protocol handler plus a mailbox:
//! - Ring buffer of recent events for `Last-Event-ID` replay
//! - Broadcast channel for live SSE delivery
//!
//! Only `initialize` may create a session. Idle sessions are evicted by a
//! background sweep and their handler is closed exactly once.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use axum::response::sse::Event;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::handler::ProtocolHandler;
use crate::error::SessionError;

/// Maximum number of events to keep in history per session.
const HISTORY_SIZE: usize = 100;

/// Builds a fresh protocol handler for a new session.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn ProtocolHandler> + Send + Sync>;

/// A buffered SSE event with ID for replay support.
#[derive(Clone, Debug)]
pub struct BufferedEvent {
    /// Monotonically increasing per session, starting at 1.
    pub id: u64,
    /// Event type ("message", "endpoint").
    pub event_type: String,
    pub data: String,
}

impl BufferedEvent {
    /// Convert to an Axum SSE Event.
    #[must_use]
    pub fn to_sse_event(&self) -> Event {
        Event::default()
            .id(self.id.to_string())
            .event(self.event_type.clone())
            .data(self.data.clone())
    }
}

/// One MCP session.
pub struct McpSession {
    pub id: String,
    pub created_at: Instant,
    last_access: RwLock<Instant>,
    handler: Arc<dyn ProtocolHandler>,
    closed: AtomicBool,
    tx: broadcast::Sender<BufferedEvent>,
    history: RwLock<VecDeque<BufferedEvent>>,
    next_event_id: AtomicU64,
}

impl McpSession {
    fn new(id: String, handler: Arc<dyn ProtocolHandler>) -> Self {
        let (tx, _) = broadcast::channel(64);
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_access: RwLock::new(now),
            handler,
            closed: AtomicBool::new(false),
            tx,
            history: RwLock::new(VecDeque::with_capacity(HISTORY_SIZE)),
            next_event_id: AtomicU64::new(1),
        }
    }

    /// The protocol handler bound to this session.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn ProtocolHandler> {
        &self.handler
    }

    /// Record activity on the session.
    pub async fn touch(&self) {
        *self.last_access.write().await = Instant::now();
    }

    /// Time since the last recorded activity.
    pub async fn idle_for(&self) -> Duration {
        self.last_access.read().await.elapsed()
    }

    /// Whether the handler has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the handler. Only the first call reaches it; returns whether this call did.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.handler.close().await;
        true
    }

    /// Store an event in the history and broadcast it to live streams.
    pub async fn push_event(&self, event_type: impl Into<String>, data: impl Into<String>) -> u64 {
        let mut history = self.history.write().await;
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let event = BufferedEvent { id, event_type: event_type.into(), data: data.into() };

        if history.len() >= HISTORY_SIZE {
            history.pop_front();
        }
        history.push_back(event.clone());

        // No subscribers is fine; the event stays in history.
        let _ = self.tx.send(event);
        id
    }

    /// Events with an id greater than `last_event_id`.
    pub async fn get_events_after(&self, last_event_id: u64) -> Vec<BufferedEvent> {
        let history = self.history.read().await;
        history.iter().filter(|e| e.id > last_event_id).cloned().collect()
    }

    /// Subscribe to live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BufferedEvent> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("id", &self.id)
            .field("next_event_id", &self.next_event_id.load(Ordering::Relaxed))
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Session id to handler map with idle-timeout eviction.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<McpSession>>>,
    factory: HandlerFactory,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(factory: HandlerFactory, idle_timeout: Duration, sweep_interval: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), factory, idle_timeout, sweep_interval }
    }

    /// Look up a session, creating it only for `initialize`.
    ///
    /// The existence check and the insert happen under one write lock, so
    /// concurrent initializes for the same id build exactly one handler.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        is_initialize: bool,
    ) -> Result<Arc<McpSession>, SessionError> {
        if let Some(session) = self.get(session_id).await {
            session.touch().await;
            return Ok(session);
        }

        if !is_initialize {
            return Err(SessionError::UnknownSession(session_id.to_string()));
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(session_id) {
            let session = Arc::clone(session);
            drop(sessions);
            session.touch().await;
            return Ok(session);
        }

        let session = Arc::new(McpSession::new(session_id.to_string(), (self.factory)()));
        sessions.insert(session_id.to_string(), Arc::clone(&session));
        drop(sessions);

        tracing::info!(session_id = %session_id, "Created MCP session");
        Ok(session)
    }

    /// Open a session under a fresh random id (legacy SSE streams).
    pub async fn open(&self) -> Arc<McpSession> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(McpSession::new(id.clone(), (self.factory)()));
        self.sessions.write().await.insert(id, Arc::clone(&session));
        tracing::info!(session_id = %session.id, "Opened legacy SSE session");
        session
    }

    /// Get an existing session by id.
    pub async fn get(&self, session_id: &str) -> Option<Arc<McpSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Remove a session and close its handler. Returns false for unknown ids.
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                session.close().await;
                tracing::info!(session_id = %session_id, "Removed MCP session");
                true
            }
            None => false,
        }
    }

    /// Remove sessions idle longer than the timeout and close them.
    pub async fn evict_stale(&self) -> usize {
        let stale = {
            let mut sessions = self.sessions.write().await;
            let mut stale_ids = Vec::new();
            for (id, session) in sessions.iter() {
                if session.idle_for().await > self.idle_timeout {
                    stale_ids.push(id.clone());
                }
            }
            stale_ids.into_iter().filter_map(|id| sessions.remove(&id)).collect::<Vec<_>>()
        };

        for session in &stale {
            session.close().await;
            tracing::info!(session_id = %session.id, "Evicted idle MCP session");
        }

        stale.len()
    }

    /// Close and drop every session.
    pub async fn close_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Start the background eviction sweep.
    pub fn start_sweep_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sweep_interval);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = self.evict_stale().await;
                if evicted > 0 {
                    tracing::debug!(count = evicted, "Session sweep completed");
                }
            }
        })
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("idle_timeout", &self.idle_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}
