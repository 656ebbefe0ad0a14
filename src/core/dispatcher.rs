use std::sync::Arc;

use async_channel::Sender;
use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDateTime;
use hyper::{HeaderMap, Request};
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use uuid::Uuid;

use crate::core::request::RequestTask;
use crate::core::response::BackendResponse;
use crate::error::GatewayError;
use crate::headers::{HeaderKind, HeaderPolicy, VERSION_NUMBER_FORMAT};

/// Gateway ingress: validates, enqueues and waits for the worker's reply
pub struct Dispatcher {
    policy: Arc<HeaderPolicy>,
    authenticate: bool,
    queue: Sender<RequestTask>,
    in_flight: TaskTracker,
}

impl Dispatcher {
    pub fn new(policy: Arc<HeaderPolicy>, authenticate: bool, queue: Sender<RequestTask>) -> Self {
        Self {
            policy,
            authenticate,
            queue,
            in_flight: TaskTracker::new(),
        }
    }

    /// Tracker counting dispatches in progress
    pub fn in_flight(&self) -> &TaskTracker {
        &self.in_flight
    }

    pub fn validate(&self, headers: &HeaderMap) -> Result<(), GatewayError> {
        validate_headers(headers, &self.policy, self.authenticate)
    }

    /// Run one request through validation, the queue and a worker
    pub async fn dispatch(
        &self,
        headers: HeaderMap,
        body: Body,
    ) -> Result<BackendResponse, GatewayError> {
        self.validate(&headers)?;

        let body = hyper::body::to_bytes(body)
            .await
            .map_err(|e| GatewayError::BodyRead(e.to_string()))?;
        let message_size = body.len();

        let (task, reply) = RequestTask::new(body, headers);
        let request_id = task.request_id.clone();

        // Blocks while the queue is full.
        self.queue
            .send(task)
            .await
            .map_err(|_| GatewayError::QueueClosed)?;

        let response = reply.await.map_err(|_| GatewayError::ReplyDropped)??;

        info!(
            request_id = %request_id,
            status = response.status.as_u16(),
            message_size,
            body = %response.body_text(),
            "Get response body"
        );
        Ok(response)
    }
}

/// Check the required headers of an inbound request.
///
/// Presence is required for every header except the version id and number,
/// and except the pre-shared key when authentication is off. With
/// authentication on, the key must be in the allow-list. Version headers, when
/// present, must carry exactly one well-formed value.
pub fn validate_headers(
    headers: &HeaderMap,
    policy: &HeaderPolicy,
    authenticate: bool,
) -> Result<(), GatewayError> {
    for header in policy.required() {
        match header.kind {
            HeaderKind::VersionId | HeaderKind::VersionNumber => continue,
            HeaderKind::PreSharedKey if !authenticate => continue,
            _ => {}
        }

        let present = headers
            .get(&header.name)
            .map_or(false, |value| !value.is_empty());
        if !present {
            return Err(GatewayError::MissingHeader(header.name.to_string()));
        }
    }

    if authenticate {
        if let Some(name) = policy.header_of_kind(HeaderKind::PreSharedKey) {
            let key = headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            if !policy.is_valid_key(key) {
                return Err(GatewayError::Unauthenticated);
            }
        }
    }

    for header in policy.required() {
        let valid = match header.kind {
            HeaderKind::VersionId => {
                single_value_matches(headers, &header.name, |v| Uuid::parse_str(v).is_ok())
            }
            HeaderKind::VersionNumber => single_value_matches(headers, &header.name, |v| {
                NaiveDateTime::parse_from_str(v, VERSION_NUMBER_FORMAT).is_ok()
            }),
            _ => true,
        };
        if !valid {
            return Err(GatewayError::InvalidHeader(header.name.to_string()));
        }
    }

    Ok(())
}

/// Absent headers pass; present ones need exactly one value satisfying `check`
fn single_value_matches(
    headers: &HeaderMap,
    name: &hyper::header::HeaderName,
    check: impl Fn(&str) -> bool,
) -> bool {
    let values: Vec<_> = headers.get_all(name).iter().collect();
    match values.as_slice() {
        [] => true,
        [value] => value.to_str().map(|v| check(v)).unwrap_or(false),
        _ => false,
    }
}

/// Axum handler for the message routes
pub async fn handle_send(
    State(dispatcher): State<Arc<Dispatcher>>,
    request: Request<Body>,
) -> Response {
    let _in_flight = dispatcher.in_flight.token();
    let (parts, body) = request.into_parts();

    match dispatcher.dispatch(parts.headers, body).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!(status = e.status_code().as_u16(), error = %e, "Request failed");
            e.into_response()
        }
    }
}
