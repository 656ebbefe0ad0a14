use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Gateway listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Pre-shared key authentication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether the pre-shared key header is required and checked
    pub enabled: bool,
}

/// ESB backend the workers forward to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Message endpoint receiving forwarded requests
    pub message_url: String,

    /// Info endpoint used to open a session
    pub info_url: String,

    /// Basic auth user name
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,

    /// Open a session before the first forward. When false a worker only
    /// starts using sessions after the backend reports an expired one.
    pub use_session: bool,

    /// Phrases in a non-200 body that mean the session has expired
    pub expiry_markers: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            message_url: "http://localhost:8950/msg".to_string(),
            info_url: "http://localhost:8950/info/".to_string(),
            username: Some("esb".to_string()),
            password: Some("esb".to_string()),
            timeout_ms: 1000,
            use_session: true,
            expiry_markers: vec![
                "Ошибка работы сеанса".to_string(),
                "Session error".to_string(),
            ],
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Credentials are only used when both parts are non-empty
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user.clone(), password.clone()))
            }
            _ => None,
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of forwarding workers
    pub count: usize,

    /// Bounded queue capacity, defaults to twice the worker count
    pub queue_capacity: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 1,
            queue_capacity: None,
        }
    }
}

impl WorkerConfig {
    pub fn capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.count * 2).max(1)
    }
}

/// Semantic kind of a required header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderKind {
    SourceTag,
    DataType,
    VersionId,
    VersionNumber,
    PreSharedKey,
    Passthrough,
}

/// A required header entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderDefinition {
    pub name: String,
    pub kind: HeaderKind,
}

impl HeaderDefinition {
    fn new(name: &str, kind: HeaderKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Required headers, their enumerations and the corruption policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// Required headers in the order they are generated and validated
    pub required: Vec<HeaderDefinition>,

    /// Value of the source tag header
    pub source_tag: String,

    /// Data type enumeration
    pub data_types: Vec<String>,

    /// Pre-shared key allow-list
    pub keys: Vec<String>,

    /// Chance, in percent, that a header is left out
    pub broken_headers_percent: u8,

    /// Chance, in percent, that a header value is replaced by the sentinel
    pub invalid_headers_percent: u8,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            required: vec![
                HeaderDefinition::new("x-esb-src", HeaderKind::SourceTag),
                HeaderDefinition::new("x-esb-data-type", HeaderKind::DataType),
                HeaderDefinition::new("x-esb-ver-id", HeaderKind::VersionId),
                HeaderDefinition::new("x-esb-ver-no", HeaderKind::VersionNumber),
                HeaderDefinition::new("x-esb-key", HeaderKind::PreSharedKey),
            ],
            source_tag: "sys:erp".to_string(),
            data_types: ["json", "xml", "html", "form-data", "binary"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            keys: vec![
                "7f3c9a2e-esb-erp".to_string(),
                "b81d04c6-esb-crm".to_string(),
                "e5a2917d-esb-wms".to_string(),
            ],
            broken_headers_percent: 10,
            invalid_headers_percent: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, overridden by RUST_LOG
    pub level: String,

    /// JSON log file; console output when unset
    pub log_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub backend: BackendConfig,
    pub workers: WorkerConfig,
    pub headers: HeaderConfig,
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::LoadError(format!("{}: {}", path.as_ref().display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.count == 0 {
            return Err(ConfigError::ValidationError(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.backend.message_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "backend message url is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,

    /// Gateway path messages are posted to
    pub path: String,

    pub thread_count: usize,
    pub messages_per_thread: usize,
    pub min_payload_bytes: usize,
    pub max_payload_bytes: usize,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    pub headers: HeaderConfig,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            path: "/msg".to_string(),
            thread_count: 6,
            messages_per_thread: 100,
            min_payload_bytes: 10,
            max_payload_bytes: 1024,
            request_timeout_ms: 1000,
            headers: HeaderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_count == 0 {
            return Err(ConfigError::ValidationError(
                "thread count must be at least 1".to_string(),
            ));
        }
        if self.min_payload_bytes > self.max_payload_bytes {
            return Err(ConfigError::ValidationError(format!(
                "min payload {} exceeds max payload {}",
                self.min_payload_bytes, self.max_payload_bytes
            )));
        }
        if self.headers.broken_headers_percent > 100 || self.headers.invalid_headers_percent > 100
        {
            return Err(ConfigError::ValidationError(
                "header percentages must be within 0..=100".to_string(),
            ));
        }
        Ok(())
    }
}
