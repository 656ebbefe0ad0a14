use bytes::Bytes;
use hyper::HeaderMap;
use tokio::sync::oneshot;

use crate::core::response::ResponseResult;

/// A validated inbound request waiting in the task queue
#[derive(Debug)]
pub struct RequestTask {
    /// Request body
    pub body: Bytes,

    /// Full inbound header set
    pub headers: HeaderMap,

    /// Request ID for tracing
    pub request_id: String,

    /// Single-use reply slot back to the dispatcher
    reply: oneshot::Sender<ResponseResult>,
}

impl RequestTask {
    /// Create a task together with the receiver its result arrives on
    pub fn new(body: Bytes, headers: HeaderMap) -> (Self, oneshot::Receiver<ResponseResult>) {
        let (reply, receiver) = oneshot::channel();
        let task = Self {
            body,
            headers,
            request_id: generate_request_id(),
            reply,
        };
        (task, receiver)
    }

    /// Post the result. Consumes the task, so a result is sent at most once.
    /// Returns false when the dispatcher stopped waiting.
    pub fn complete(self, result: ResponseResult) -> bool {
        self.reply.send(result).is_ok()
    }
}

/// Generate a unique request ID
fn generate_request_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    format!("{:x}-{:x}", timestamp, counter)
}
