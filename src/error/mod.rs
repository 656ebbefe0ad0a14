use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Backend request failed: {0}")]
    Backend(#[from] reqwest::Error),

    #[error("Backend session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Task queue is closed")]
    QueueClosed,

    #[error("Worker dropped the reply channel")]
    ReplyDropped,

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// HTTP status code mapping for gateway errors
impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidHeader(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthenticated => StatusCode::FORBIDDEN,
            GatewayError::BodyRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::SessionUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::QueueClosed => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::ReplyDropped => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Load generator errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),

    #[error("Error marshaling message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Configuration specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_map_to_client_errors() {
        assert_eq!(
            GatewayError::MissingHeader("x-esb-src".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::InvalidHeader("x-esb-ver-id".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Unauthenticated.status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_processing_errors_map_to_500() {
        assert_eq!(
            GatewayError::BodyRead("eof".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::QueueClosed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_into_response_carries_error_text() {
        let response = GatewayError::ReplyDropped.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
