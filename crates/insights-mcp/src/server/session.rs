//! Session mailboxes for the HTTP transport.
//!
//! Each MCP session buffers the events it has produced so a reconnecting
//! client can replay what it missed (Last-Event-ID), while live events go
//! out over a broadcast channel. Stale sessions are swept in the
//! background.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::sse::Event;
use tokio::sync::{RwLock, broadcast};

/// Events kept for replay per session.
const HISTORY_SIZE: usize = 100;

/// Idle time after which a session is dropped.
const SESSION_TIMEOUT: Duration = Duration::from_secs(3600);

/// Sweep interval for stale sessions.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// A buffered SSE event with an id for replay.
#[derive(Clone, Debug)]
pub struct BufferedEvent {
    pub id: u64,
    pub event_type: String,
    pub data: String,
}

impl BufferedEvent {
    /// Convert to an axum SSE event.
    #[must_use]
    pub fn to_sse_event(&self) -> Event {
        Event::default().id(self.id.to_string()).event(self.event_type.clone()).data(self.data.clone())
    }
}

struct SessionInner {
    history: VecDeque<BufferedEvent>,
    next_event_id: u64,
    last_active: Instant,
}

/// One MCP session.
pub struct Session {
    pub id: String,
    tx: broadcast::Sender<BufferedEvent>,
    inner: RwLock<SessionInner>,
}

impl Session {
    fn new(id: String) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            id,
            tx,
            inner: RwLock::new(SessionInner {
                history: VecDeque::with_capacity(HISTORY_SIZE),
                next_event_id: 1,
                last_active: Instant::now(),
            }),
        }
    }

    /// Buffer an event and broadcast it to live subscribers.
    pub async fn push_event(&self, event_type: impl Into<String>, data: impl Into<String>) -> u64 {
        let event = {
            let mut inner = self.inner.write().await;
            let event = BufferedEvent {
                id: inner.next_event_id,
                event_type: event_type.into(),
                data: data.into(),
            };
            inner.next_event_id += 1;
            if inner.history.len() >= HISTORY_SIZE {
                inner.history.pop_front();
            }
            inner.history.push_back(event.clone());
            inner.last_active = Instant::now();
            event
        };

        let id = event.id;
        let _ = self.tx.send(event);
        id
    }

    /// Events after `last_event_id`, for replay on reconnection.
    pub async fn events_after(&self, last_event_id: u64) -> Vec<BufferedEvent> {
        let inner = self.inner.read().await;
        inner.history.iter().filter(|e| e.id > last_event_id).cloned().collect()
    }

    /// Subscribe to live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BufferedEvent> {
        self.tx.subscribe()
    }

    /// Refresh the idle timer.
    pub async fn touch(&self) {
        self.inner.write().await.last_active = Instant::now();
    }

    async fn is_stale(&self) -> bool {
        self.inner.read().await.last_active.elapsed() > SESSION_TIMEOUT
    }

    /// The session id as an HTTP header value.
    #[must_use]
    pub fn id_header(&self) -> axum::http::HeaderValue {
        axum::http::HeaderValue::from_str(&self.id)
            .unwrap_or_else(|_| axum::http::HeaderValue::from_static("invalid"))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

/// Session registry.
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh session.
    pub async fn create_session(&self) -> Arc<Session> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone()));
        self.sessions.write().await.insert(id, Arc::clone(&session));
        tracing::info!(session_id = %session.id, "Created session");
        session
    }

    /// Get a session, refreshing its idle timer; create one when the id is
    /// absent or unknown.
    pub async fn get_or_create(&self, id: Option<&str>) -> Arc<Session> {
        if let Some(id) = id {
            let found = self.sessions.read().await.get(id).cloned();
            if let Some(session) = found {
                session.touch().await;
                return session;
            }
        }
        self.create_session().await
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle past the timeout.
    pub async fn cleanup_stale(&self) -> usize {
        let candidates: Vec<(String, Arc<Session>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| (id.clone(), Arc::clone(session)))
            .collect();

        let mut removed = 0;
        for (id, session) in candidates {
            if session.is_stale().await {
                self.sessions.write().await.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    /// Spawn the background sweep.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_stale().await;
                if removed > 0 {
                    tracing::debug!(count = removed, "Swept stale sessions");
                }
            }
        });
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish()
    }
}
