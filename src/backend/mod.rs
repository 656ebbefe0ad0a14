//! In-process stand-in for the ESB backend.
//!
//! Hands out `ibsession` cookies on its info endpoint and accepts messages,
//! optionally insisting on a live session and expiring sessions on demand.

mod routes;

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Behaviour switches for the mock backend
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MockEsbConfig {
    /// Reject messages without a live session cookie
    pub require_session: bool,
    /// Expire every session after this many accepted messages
    pub expire_every: Option<u64>,
    /// Body of the rejection sent for a missing or stale session
    pub expiry_message: String,
    /// Delay before answering a message
    pub response_delay_ms: u64,
}

impl Default for MockEsbConfig {
    fn default() -> Self {
        Self {
            require_session: false,
            expire_every: None,
            expiry_message: "Session error: session expired".to_string(),
            response_delay_ms: 0,
        }
    }
}

/// Shared state of a running mock backend
#[derive(Debug)]
pub struct MockEsb {
    config: MockEsbConfig,
    sessions: Mutex<HashSet<String>>,
    messages: AtomicU64,
    accepted: AtomicU64,
    sessions_opened: AtomicU64,
}

impl MockEsb {
    pub fn new(config: MockEsbConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: Mutex::new(HashSet::new()),
            messages: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
        })
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/info", get(routes::open_session))
            .route("/info/", get(routes::open_session))
            .route("/msg", post(routes::receive_message))
            .route("/health", get(routes::health_check))
            .with_state(self)
    }

    /// Serve on `addr` until `shutdown` resolves
    pub async fn serve(
        self: Arc<Self>,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), hyper::Error> {
        let server = axum::Server::try_bind(&addr)?.serve(self.router().into_make_service());
        tracing::info!(addr = %server.local_addr(), "Mock ESB listening");
        server.with_graceful_shutdown(shutdown).await
    }

    /// Drop every live session
    pub fn expire_sessions(&self) {
        let mut sessions = self.sessions.lock();
        tracing::info!(count = sessions.len(), "Expiring sessions");
        sessions.clear();
    }

    /// Message calls received, rejected ones included
    pub fn message_count(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Messages answered with 200
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Sessions handed out since start
    pub fn session_count(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }

    fn open_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.lock().insert(id.clone());
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        id
    }

    fn is_live(&self, session: Option<&str>) -> bool {
        session.map_or(false, |id| self.sessions.lock().contains(id))
    }

    fn response_delay(&self) -> Option<Duration> {
        (self.config.response_delay_ms > 0)
            .then(|| Duration::from_millis(self.config.response_delay_ms))
    }

    /// Count an accepted message and apply the expiry schedule
    fn accept(&self) {
        let accepted = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(every) = self.config.expire_every.filter(|every| *every > 0) {
            if accepted % every == 0 {
                self.expire_sessions();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_live_until_expired() {
        let esb = MockEsb::new(MockEsbConfig::default());
        let id = esb.open_session();

        assert!(esb.is_live(Some(&id)));
        assert!(!esb.is_live(Some("unknown")));
        assert!(!esb.is_live(None));

        esb.expire_sessions();
        assert!(!esb.is_live(Some(&id)));
        assert_eq!(esb.session_count(), 1);
    }

    #[test]
    fn test_expire_every_schedule() {
        let esb = MockEsb::new(MockEsbConfig {
            expire_every: Some(2),
            ..MockEsbConfig::default()
        });
        let id = esb.open_session();

        esb.accept();
        assert!(esb.is_live(Some(&id)));
        esb.accept();
        assert!(!esb.is_live(Some(&id)));
        assert_eq!(esb.accepted_count(), 2);
    }
}
