use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use hyper::StatusCode;

use crate::error::GatewayError;

/// Backend reply relayed verbatim to the caller
#[derive(Debug, Clone)]
pub struct BackendResponse {
    /// HTTP status code
    pub status: StatusCode,

    /// Response body
    pub body: Bytes,
}

/// Outcome of forwarding one task, produced exactly once per task
pub type ResponseResult = Result<BackendResponse, GatewayError>;

impl BackendResponse {
    pub fn new(status: StatusCode, body: Bytes) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Body as text, for logging and marker matching
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl IntoResponse for BackendResponse {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}
