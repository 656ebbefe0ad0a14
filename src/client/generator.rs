use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::StatusCode;
use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::stats::{StatisticsAggregator, StatsSummary};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::headers::{sentinel_headers, HeaderFactory, HeaderPolicy};
use crate::models::{random_payload, Message};

/// Outcome of a finished generator run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: StatsSummary,
    /// Messages scheduled: threads × messages per thread
    pub total_messages: u64,
    #[serde(serialize_with = "as_secs")]
    pub wall_clock: Duration,
    pub messages_per_second: f64,
}

fn as_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary)?;
        write!(
            f,
            "Sent {} messages in {:.2?} ({:.2} messages/sec)",
            self.total_messages, self.wall_clock, self.messages_per_second
        )
    }
}

/// Concurrent HTTP load generator aimed at the gateway
pub struct LoadGenerator {
    config: Arc<ClientConfig>,
    factory: HeaderFactory,
    base_headers: HeaderMap,
    stats: Arc<StatisticsAggregator>,
    cancel: CancellationToken,
}

impl LoadGenerator {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let policy = HeaderPolicy::from_config(&config.headers)?;

        Ok(Self {
            config: Arc::new(config),
            factory: HeaderFactory::new(Arc::new(policy)),
            base_headers: HeaderMap::new(),
            stats: Arc::new(StatisticsAggregator::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Headers that passthrough entries are copied from
    pub fn with_base_headers(mut self, headers: HeaderMap) -> Self {
        self.base_headers = headers;
        self
    }

    /// Token that stops every worker before its next send
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> Arc<StatisticsAggregator> {
        self.stats.clone()
    }

    /// Run every worker to completion or cancellation.
    ///
    /// Statistics cover this run only; they are cleared when it starts.
    pub async fn run(&self) -> Result<RunReport, ClientError> {
        self.stats.reset();
        let endpoint = self.config.endpoint();
        info!(
            endpoint = %endpoint,
            threads = self.config.thread_count,
            messages = self.config.messages_per_thread,
            "Starting load generator"
        );

        let started = Instant::now();
        let mut handles = Vec::with_capacity(self.config.thread_count);

        for thread_id in 1..=self.config.thread_count {
            let client = Client::builder()
                .timeout(self.config.request_timeout())
                .build()
                .map_err(ClientError::HttpClient)?;

            let headers = {
                let mut rng = rand::thread_rng();
                self.factory.build(&self.base_headers, &mut rng)
            };

            let worker = Worker {
                thread_id,
                client,
                endpoint: endpoint.clone(),
                headers,
                config: self.config.clone(),
                factory: self.factory.clone(),
                stats: self.stats.clone(),
                cancel: self.cancel.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Generator worker stopped early");
                    first_error.get_or_insert(e);
                }
                Err(e) => error!(error = %e, "Generator worker panicked"),
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let wall_clock = started.elapsed();
        let total_messages = (self.config.thread_count * self.config.messages_per_thread) as u64;
        let seconds = wall_clock.as_secs_f64();
        let report = RunReport {
            summary: self.stats.summary(),
            total_messages,
            wall_clock,
            messages_per_second: if seconds > 0.0 {
                total_messages as f64 / seconds
            } else {
                0.0
            },
        };

        info!(
            total_messages,
            wall_clock_secs = seconds,
            messages_per_second = report.messages_per_second,
            success = report.summary.success_count,
            failed = report.summary.fail_count,
            cancelled = self.cancel.is_cancelled(),
            "All messages sent"
        );
        Ok(report)
    }
}

struct Worker {
    thread_id: usize,
    client: Client,
    endpoint: String,
    headers: HeaderMap,
    config: Arc<ClientConfig>,
    factory: HeaderFactory,
    stats: Arc<StatisticsAggregator>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) -> Result<(), ClientError> {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for sequence in 1..=self.config.messages_per_thread {
            if self.cancel.is_cancelled() {
                info!(thread_id = self.thread_id, sent = sequence - 1, "Generator cancelled");
                break;
            }

            let message = {
                let mut rng = rand::thread_rng();
                let size =
                    rng.gen_range(self.config.min_payload_bytes..=self.config.max_payload_bytes);
                Message::new(
                    Message::id_for(self.thread_id, sequence),
                    random_payload(&mut rng, size),
                )
            };
            let body = serde_json::to_vec(&message)?;
            self.warn_on_corrupt_headers(&message.id);

            info!(
                thread_id = self.thread_id,
                message_id = %message.id,
                size = message.payload.len(),
                "Sending message"
            );

            let started = Instant::now();
            let result = self
                .client
                .post(&self.endpoint)
                .headers(self.headers.clone())
                .body(body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let elapsed = started.elapsed();
                    self.stats.record_request(status == StatusCode::OK, elapsed);

                    let text = response.text().await.unwrap_or_default();
                    info!(
                        thread_id = self.thread_id,
                        message_id = %message.id,
                        status = status.as_u16(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        body = %text,
                        "Received response"
                    );
                }
                Err(e) => {
                    self.stats.record_request(false, started.elapsed());
                    error!(
                        thread_id = self.thread_id,
                        message_id = %message.id,
                        error = %ClientError::Transport(e),
                        "Error sending request"
                    );
                }
            }
        }

        Ok(())
    }

    fn warn_on_corrupt_headers(&self, message_id: &str) {
        let policy = self.factory.policy();
        let missing = policy.missing_count(&self.headers);
        if missing > 0 {
            warn!(
                thread_id = self.thread_id,
                message_id,
                missing,
                expected = policy.required().len(),
                "Not all required headers were generated"
            );
        }
        for name in sentinel_headers(&self.headers) {
            warn!(
                thread_id = self.thread_id,
                message_id,
                header = %name,
                "Invalid header value generated"
            );
        }
    }
}
