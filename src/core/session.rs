use bytes::Bytes;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, COOKIE, HOST,
    TRANSFER_ENCODING,
};
use hyper::StatusCode;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::core::response::{BackendResponse, ResponseResult};
use crate::error::GatewayError;

/// Cookie carrying the backend session id
pub const SESSION_COOKIE: &str = "ibsession";

/// Header asking the info endpoint to open a session
pub const SESSION_START_HEADER: &str = "IBSession";

/// Cookie session against the ESB backend.
///
/// Each worker owns exactly one manager and drives it sequentially, so the
/// cookie needs no synchronization.
#[derive(Debug)]
pub struct SessionManager {
    client: Client,
    message_url: String,
    info_url: String,
    credentials: Option<(String, String)>,
    expiry_markers: Vec<String>,
    enabled: bool,
    cookie: Option<String>,
}

impl SessionManager {
    pub fn new(config: &BackendConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            message_url: config.message_url.clone(),
            info_url: config.info_url.clone(),
            credentials: config.credentials(),
            expiry_markers: config.expiry_markers.clone(),
            enabled: config.use_session,
            cookie: None,
        })
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Forget the current session; the next call opens a new one
    pub fn invalidate(&mut self) {
        self.cookie = None;
    }

    /// Open a session on the info endpoint and keep its cookie
    pub async fn establish(&mut self) -> Result<(), GatewayError> {
        self.cookie = None;

        let mut request = self
            .client
            .get(&self.info_url)
            .header(SESSION_START_HEADER, "start");
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(GatewayError::SessionUnavailable(format!(
                "info endpoint answered {}",
                response.status()
            )));
        }

        self.cookie = response
            .cookies()
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string());

        if self.cookie.is_some() {
            info!(url = %self.info_url, "Backend session established");
        } else {
            warn!(url = %self.info_url, "Info endpoint returned no session cookie");
        }
        Ok(())
    }

    /// True when a non-200 reply says the session is gone
    pub fn is_expired(&self, response: &BackendResponse) -> bool {
        if response.is_success() {
            return false;
        }
        let text = response.body_text();
        self.expiry_markers
            .iter()
            .any(|marker| !marker.is_empty() && text.contains(marker.as_str()))
    }

    /// Forward a task to the backend, retrying once on session expiry.
    pub async fn forward(&mut self, body: Bytes, headers: &HeaderMap) -> ResponseResult {
        let response = self.try_send(&body, headers).await?;
        if !self.is_expired(&response) {
            return Ok(response);
        }

        warn!(
            status = response.status.as_u16(),
            "Backend session expired, retrying with a new session"
        );
        self.invalidate();
        self.enabled = true;
        self.try_send(&body, headers).await
    }

    async fn try_send(&mut self, body: &Bytes, inbound: &HeaderMap) -> ResponseResult {
        let mut headers = outbound_headers(inbound);

        if self.credentials.is_some() {
            headers.remove(AUTHORIZATION);
        }

        if self.enabled && self.cookie.is_none() {
            if let Err(e) = self.establish().await {
                warn!(error = %e, "Failed to open backend session, forwarding without one");
            }
        }

        if let Some(cookie) = &self.cookie {
            attach_session_cookie(&mut headers, cookie);
        }

        let mut request = self
            .client
            .post(&self.message_url)
            .headers(headers)
            .body(body.clone());
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(status = status.as_u16(), size = body.len(), "Backend replied");

        Ok(BackendResponse::new(status, body))
    }
}

/// Copy of the inbound headers without connection-level ones
fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if !is_connection_header(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Add the session cookie, folding any inbound cookies into one `Cookie` header
fn attach_session_cookie(headers: &mut HeaderMap, session: &str) {
    let mut pairs: Vec<String> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            pair.split_once('=')
                .map_or(true, |(name, _)| name != SESSION_COOKIE)
        })
        .map(str::to_string)
        .collect();
    pairs.push(format!("{}={}", SESSION_COOKIE, session));

    match HeaderValue::from_str(&pairs.join("; ")) {
        Ok(value) => {
            headers.insert(COOKIE, value);
        }
        Err(e) => warn!(error = %e, "Session cookie is not a valid header value"),
    }
}

/// Headers tied to the inbound connection, never copied to the backend call
fn is_connection_header(name: &HeaderName) -> bool {
    *name == HOST || *name == CONTENT_LENGTH || *name == CONNECTION || *name == TRANSFER_ENCODING
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockEsb, MockEsbConfig};
    use axum::routing::{get, post};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    async fn spawn_esb(config: MockEsbConfig) -> (std::sync::Arc<MockEsb>, SocketAddr) {
        let esb = MockEsb::new(config);
        let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
            .serve(esb.clone().router().into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        (esb, addr)
    }

    fn backend_config(addr: SocketAddr, use_session: bool) -> BackendConfig {
        BackendConfig {
            message_url: format!("http://{}/msg", addr),
            info_url: format!("http://{}/info/", addr),
            use_session,
            ..BackendConfig::default()
        }
    }

    #[test]
    fn test_outbound_headers_drop_connection_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("gateway:8080"));
        inbound.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert("x-esb-src", HeaderValue::from_static("sys:erp"));
        inbound.append("x-esb-tag", HeaderValue::from_static("a"));
        inbound.append("x-esb-tag", HeaderValue::from_static("b"));

        let outbound = outbound_headers(&inbound);
        assert!(outbound.get(HOST).is_none());
        assert!(outbound.get(CONTENT_LENGTH).is_none());
        assert_eq!(outbound.get("x-esb-src").unwrap(), "sys:erp");
        assert_eq!(outbound.get_all("x-esb-tag").iter().count(), 2);
    }

    #[test]
    fn test_session_cookie_joins_inbound_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; lang=ru"));
        headers.append(COOKIE, HeaderValue::from_static("ibsession=stale"));

        attach_session_cookie(&mut headers, "fresh");

        let cookies: Vec<_> = headers.get_all(COOKIE).iter().collect();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0], "theme=dark; lang=ru; ibsession=fresh");

        let mut bare = HeaderMap::new();
        attach_session_cookie(&mut bare, "abc");
        assert_eq!(bare.get(COOKIE).unwrap(), "ibsession=abc");
    }

    #[test]
    fn test_expiry_detection_needs_non_200_and_marker() {
        let session = SessionManager::new(&BackendConfig::default()).unwrap();

        let expired = BackendResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from("Session error: unknown session"),
        );
        assert!(session.is_expired(&expired));

        let localized = BackendResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from("Ошибка работы сеанса"),
        );
        assert!(session.is_expired(&localized));

        let ok_with_marker = BackendResponse::new(StatusCode::OK, Bytes::from("Session error"));
        assert!(!session.is_expired(&ok_with_marker));

        let other_failure =
            BackendResponse::new(StatusCode::BAD_GATEWAY, Bytes::from("upstream down"));
        assert!(!session.is_expired(&other_failure));
    }

    #[tokio::test]
    async fn test_establish_captures_cookie() {
        let (esb, addr) = spawn_esb(MockEsbConfig::default()).await;
        let mut session = SessionManager::new(&backend_config(addr, true)).unwrap();

        assert!(session.cookie().is_none());
        session.establish().await.unwrap();
        assert!(session.cookie().is_some());
        assert_eq!(esb.session_count(), 1);
    }

    #[tokio::test]
    async fn test_forward_opens_session_lazily() {
        let (esb, addr) = spawn_esb(MockEsbConfig {
            require_session: true,
            ..MockEsbConfig::default()
        })
        .await;
        let mut session = SessionManager::new(&backend_config(addr, true)).unwrap();

        let response = session
            .forward(Bytes::from("first"), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from("first"));

        let response = session
            .forward(Bytes::from("second"), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        // one session reused for both messages
        assert_eq!(esb.session_count(), 1);
        assert_eq!(esb.message_count(), 2);
    }

    #[tokio::test]
    async fn test_forward_retries_once_after_expiry() {
        let (esb, addr) = spawn_esb(MockEsbConfig {
            require_session: true,
            ..MockEsbConfig::default()
        })
        .await;
        let mut session = SessionManager::new(&backend_config(addr, true)).unwrap();

        session
            .forward(Bytes::from("warmup"), &HeaderMap::new())
            .await
            .unwrap();
        let stale = session.cookie().map(str::to_string);

        esb.expire_sessions();
        let response = session
            .forward(Bytes::from("after expiry"), &HeaderMap::new())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(esb.message_count(), 3);
        assert_eq!(esb.session_count(), 2);
        assert_ne!(session.cookie().map(str::to_string), stale);
    }

    #[tokio::test]
    async fn test_retry_happens_only_once_when_expiry_persists() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let app = axum::Router::new()
            .route("/info/", get(|| async { "info" }))
            .route(
                "/msg",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Ошибка работы сеанса: closed",
                        )
                    }
                }),
            );
        let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
            .serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);

        let mut session = SessionManager::new(&backend_config(addr, true)).unwrap();
        let response = session
            .forward(Bytes::from("payload"), &HeaderMap::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body_text(), "Ошибка работы сеанса: closed");
    }

    #[tokio::test]
    async fn test_sessionless_worker_switches_on_after_expiry() {
        let (esb, addr) = spawn_esb(MockEsbConfig {
            require_session: true,
            ..MockEsbConfig::default()
        })
        .await;
        let mut session = SessionManager::new(&backend_config(addr, false)).unwrap();
        assert!(!session.is_enabled());

        let response = session
            .forward(Bytes::from("payload"), &HeaderMap::new())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert!(session.is_enabled());
        assert_eq!(esb.message_count(), 2);
        assert_eq!(esb.session_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_info_endpoint_still_forwards() {
        let (esb, addr) = spawn_esb(MockEsbConfig::default()).await;
        let config = BackendConfig {
            info_url: "http://127.0.0.1:1/info/".to_string(),
            ..backend_config(addr, true)
        };
        let mut session = SessionManager::new(&config).unwrap();

        let response = session
            .forward(Bytes::from("no session"), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert!(session.cookie().is_none());
        assert_eq!(esb.message_count(), 1);
    }
}
