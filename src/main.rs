use std::error::Error;
use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use esb_stress::config::GatewayConfig;
use esb_stress::core::gateway::{shutdown_signal, ApiGateway, Gateway};
use esb_stress::logging::init_tracing;

const DEFAULT_LOG_FILE: &str = "server.json";

#[derive(Parser, Debug)]
#[command(name = "esb-gateway")]
#[command(about = "Session-affine gateway in front of an ESB message endpoint")]
struct Args {
    /// TOML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Number of backend workers
    #[arg(long)]
    workers: Option<usize>,

    /// Task queue capacity, twice the worker count by default
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Require a known pre-shared key on every request
    #[arg(
        long = "auth",
        env = "AUTHENTICATE_REQUESTS",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    authenticate: Option<bool>,

    /// Backend message URL
    #[arg(long)]
    backend_url: Option<String>,

    /// Backend info URL used to open sessions
    #[arg(long)]
    info_url: Option<String>,

    #[arg(long)]
    backend_user: Option<String>,

    #[arg(long)]
    backend_password: Option<String>,

    /// JSON log file; pass an empty value to log to the console
    #[arg(long)]
    log: Option<String>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<GatewayConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::from_file(path)?,
            None => GatewayConfig::default(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(workers) = self.workers {
            config.workers.count = workers;
        }
        if self.queue_capacity.is_some() {
            config.workers.queue_capacity = self.queue_capacity;
        }
        if let Some(authenticate) = self.authenticate {
            config.auth.enabled = authenticate;
        }
        if let Some(url) = self.backend_url {
            config.backend.message_url = url;
        }
        if let Some(url) = self.info_url {
            config.backend.info_url = url;
        }
        if self.backend_user.is_some() {
            config.backend.username = self.backend_user;
        }
        if self.backend_password.is_some() {
            config.backend.password = self.backend_password;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }

        config.logging.log_file = self
            .log
            .or(config.logging.log_file)
            .or_else(|| Some(DEFAULT_LOG_FILE.to_string()))
            .filter(|path| !path.is_empty());

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Args::parse().into_config()?;

    // Flushes the log file when dropped
    let _guard = init_tracing(&config.logging)?;

    let gateway = ApiGateway::new(config)?;
    gateway.start().await?;

    if let Some(addr) = gateway.local_addr().await {
        println!("Server started on {}", addr);
    }

    shutdown_signal().await;
    println!("Server shutting down. Waiting for active requests to complete...");

    gateway.stop().await?;
    println!("Server gracefully stopped.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("esb-gateway").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_auth_flag_accepts_boolish_values() {
        assert_eq!(parse(&["--auth", "1"]).authenticate, Some(true));
        assert_eq!(parse(&["--auth", "T"]).authenticate, Some(true));
        assert_eq!(parse(&["--auth", "0"]).authenticate, Some(false));
        assert_eq!(parse(&["--auth", "false"]).authenticate, Some(false));
        assert_eq!(parse(&["--auth"]).authenticate, Some(true));
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = parse(&["--port", "9090", "--workers", "4", "--log", ""])
            .into_config()
            .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.workers.count, 4);
        assert_eq!(config.workers.capacity(), 8);
        assert!(config.logging.log_file.is_none());
    }
}
