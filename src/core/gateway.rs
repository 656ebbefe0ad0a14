use std::net::SocketAddr;
use std::sync::Arc;

use async_channel::Sender;
use async_trait::async_trait;
use axum::routing::{get, post};

use crate::config::GatewayConfig;
use crate::core::dispatcher::{handle_send, Dispatcher};
use crate::core::request::RequestTask;
use crate::core::session::SessionManager;
use crate::core::worker::WorkerPool;
use crate::error::GatewayError;
use crate::headers::HeaderPolicy;

/// Core gateway lifecycle
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Start workers and the HTTP listener
    async fn start(&self) -> Result<(), GatewayError>;

    /// Drain in-flight requests, close the queue and stop the workers
    async fn stop(&self) -> Result<(), GatewayError>;

    /// Check if the gateway is healthy
    async fn health_check(&self) -> bool;
}

/// Build the gateway's HTTP routes
pub fn router(dispatcher: Arc<Dispatcher>) -> axum::Router {
    axum::Router::new()
        .route("/send", post(handle_send))
        .route("/send/", post(handle_send))
        .route("/msg", post(handle_send))
        .route("/msg/", post(handle_send))
        .route("/health", get(|| async { "OK" }))
        .with_state(dispatcher)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// ESB gateway: dispatcher, bounded queue and worker pool behind one listener
pub struct ApiGateway {
    /// Gateway configuration
    config: GatewayConfig,
    /// Header policy shared with the dispatcher
    policy: Arc<HeaderPolicy>,
    /// Running server state
    server_state: Arc<tokio::sync::Mutex<ServerState>>,
}

/// Server state that can be mutated
#[derive(Default)]
struct ServerState {
    /// Server handle for graceful shutdown
    server_handle: Option<tokio::task::JoinHandle<()>>,
    /// Shutdown signal sender
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    /// Bound address
    local_addr: Option<SocketAddr>,
    dispatcher: Option<Arc<Dispatcher>>,
    queue: Option<Sender<RequestTask>>,
    workers: Option<WorkerPool>,
}

impl ApiGateway {
    /// Create a gateway; fails on an invalid configuration
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let policy = Arc::new(HeaderPolicy::from_config(&config.headers)?);

        Ok(Self {
            config,
            policy,
            server_state: Arc::new(tokio::sync::Mutex::new(ServerState::default())),
        })
    }

    /// Address the listener is bound to, once started
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server_state.lock().await.local_addr
    }

    /// Number of dispatcher calls currently in progress
    pub async fn in_flight(&self) -> usize {
        self.server_state
            .lock()
            .await
            .dispatcher
            .as_ref()
            .map_or(0, |dispatcher| dispatcher.in_flight().len())
    }
}

#[async_trait]
impl Gateway for ApiGateway {
    async fn start(&self) -> Result<(), GatewayError> {
        // Check if server is already running
        let mut server_state = self.server_state.lock().await;
        if server_state.server_handle.is_some() {
            return Err(GatewayError::InternalError(
                "Server is already running".to_string(),
            ));
        }

        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| GatewayError::InternalError(format!("Invalid address: {}", e)))?;

        let sessions = (0..self.config.workers.count)
            .map(|_| SessionManager::new(&self.config.backend))
            .collect::<Result<Vec<_>, _>>()?;

        let builder = axum::Server::try_bind(&addr)
            .map_err(|e| GatewayError::InternalError(format!("Failed to bind {}: {}", addr, e)))?;

        let (queue_tx, queue_rx) = async_channel::bounded(self.config.workers.capacity());
        let workers = WorkerPool::start(sessions, queue_rx);

        let dispatcher = Arc::new(Dispatcher::new(
            self.policy.clone(),
            self.config.auth.enabled,
            queue_tx.clone(),
        ));
        let app = router(dispatcher.clone());

        let server = builder.serve(app.into_make_service());
        let local_addr = server.local_addr();

        // Create a shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let server_handle = tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                tracing::info!("Shutdown signal received, no longer accepting connections");
            });

            if let Err(e) = graceful.await {
                tracing::error!("Server error: {}", e);
            }
        });

        tracing::info!(
            addr = %local_addr,
            workers = workers.size(),
            queue_capacity = self.config.workers.capacity(),
            authenticate = self.config.auth.enabled,
            "Starting server"
        );

        server_state.server_handle = Some(server_handle);
        server_state.shutdown_tx = Some(shutdown_tx);
        server_state.local_addr = Some(local_addr);
        server_state.dispatcher = Some(dispatcher);
        server_state.queue = Some(queue_tx);
        server_state.workers = Some(workers);

        Ok(())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        let mut server_state = self.server_state.lock().await;

        let handle = server_state
            .server_handle
            .take()
            .ok_or_else(|| GatewayError::InternalError("Server is not running".to_string()))?;

        tracing::info!("Server shutting down. Waiting for active requests to complete...");

        if let Some(tx) = server_state.shutdown_tx.take() {
            // We don't care if the receiver is dropped
            let _ = tx.send(());
        }

        if let Some(dispatcher) = server_state.dispatcher.take() {
            dispatcher.in_flight().close();
            dispatcher.in_flight().wait().await;
        }

        if let Some(queue) = server_state.queue.take() {
            queue.close();
        }
        if let Some(workers) = server_state.workers.take() {
            workers.join().await;
        }

        server_state.local_addr = None;

        match handle.await {
            Ok(_) => {
                tracing::info!("Server shutdown complete");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error while shutting down server: {}", e);
                Err(GatewayError::InternalError(format!(
                    "Error while shutting down server: {}",
                    e
                )))
            }
        }
    }

    async fn health_check(&self) -> bool {
        let server_state = self.server_state.lock().await;
        let serving = server_state
            .server_handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished());
        let working = server_state
            .workers
            .as_ref()
            .map_or(false, |workers| workers.is_running());
        serving && working
    }
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
