// ESB stress harness library

pub mod backend;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod headers;
pub mod logging;
pub mod models;

// Re-export commonly used types
pub use client::{LoadGenerator, RunReport, StatisticsAggregator, StatsSummary};
pub use config::{ClientConfig, GatewayConfig};
pub use crate::core::{
    dispatcher::Dispatcher,
    gateway::{ApiGateway, Gateway},
    request::RequestTask,
    response::{BackendResponse, ResponseResult},
    session::SessionManager,
    worker::WorkerPool,
};
pub use error::{ClientError, ConfigError, GatewayError};
pub use headers::{HeaderFactory, HeaderPolicy};
pub use models::Message;
