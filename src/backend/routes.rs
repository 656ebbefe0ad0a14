use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use hyper::header::{COOKIE, SET_COOKIE};
use tokio::time::sleep;

use super::MockEsb;
use crate::core::session::{SESSION_COOKIE, SESSION_START_HEADER};

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Info endpoint; opens a session when asked to
pub async fn open_session(State(esb): State<Arc<MockEsb>>, headers: HeaderMap) -> Response {
    let start = headers
        .get(SESSION_START_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.eq_ignore_ascii_case("start"));
    if !start {
        return (StatusCode::OK, "ESB mock").into_response();
    }

    let id = esb.open_session();
    tracing::debug!(session = %id, "Session opened");

    let mut response = (StatusCode::OK, "ESB mock").into_response();
    if let Ok(cookie) = HeaderValue::from_str(&format!("{}={}; Path=/", SESSION_COOKIE, id)) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

/// Message endpoint; echoes the body back
pub async fn receive_message(
    State(esb): State<Arc<MockEsb>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Bytes) {
    esb.messages.fetch_add(1, Ordering::Relaxed);

    if let Some(delay) = esb.response_delay() {
        sleep(delay).await;
    }

    if esb.config.require_session && !esb.is_live(session_cookie(&headers).as_deref()) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from(esb.config.expiry_message.clone()),
        );
    }

    esb.accept();
    (StatusCode::OK, body)
}

/// Value of the session cookie, if the request carries one
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_cookie(&headers), None);

        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; ibsession=abc-123; lang=ru"),
        );
        assert_eq!(session_cookie(&headers).as_deref(), Some("abc-123"));
    }
}
