use std::error::Error;

use clap::Parser;

use esb_stress::client::LoadGenerator;
use esb_stress::config::{ClientConfig, HeaderConfig, LoggingConfig};
use esb_stress::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "esb-client")]
#[command(about = "Send concurrent messages with randomized ESB headers and report response statistics")]
struct Args {
    #[arg(long, env = "SERVICE_HOST", default_value = "localhost")]
    host: String,

    #[arg(long, env = "SERVICE_PORT", default_value_t = 8080)]
    port: u16,

    /// Gateway path messages are posted to
    #[arg(long, default_value = "/msg")]
    path: String,

    /// Number of concurrent senders
    #[arg(long, env = "THREADS", default_value_t = 6)]
    threads: usize,

    /// Messages per sender
    #[arg(long, env = "MESSAGES", default_value_t = 100)]
    messages: usize,

    #[arg(long, env = "MIN_PAYLOAD", default_value_t = 10)]
    min_payload: usize,

    #[arg(long, env = "MAX_PAYLOAD", default_value_t = 1024)]
    max_payload: usize,

    /// Chance in percent that a header is left out
    #[arg(long, env = "BROKEN_HEADERS_PERCENT", default_value_t = 10)]
    broken_headers_percent: u8,

    /// Chance in percent that a header value is replaced by a sentinel
    #[arg(long, env = "INVALID_HEADERS_PERCENT", default_value_t = 10)]
    invalid_headers_percent: u8,

    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// JSON log file; pass an empty value to log to the console
    #[arg(long, default_value = "client.json")]
    log: String,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        ClientConfig {
            host: args.host,
            port: args.port,
            path: args.path,
            thread_count: args.threads,
            messages_per_thread: args.messages,
            min_payload_bytes: args.min_payload,
            max_payload_bytes: args.max_payload,
            request_timeout_ms: args.timeout_ms,
            headers: HeaderConfig {
                broken_headers_percent: args.broken_headers_percent,
                invalid_headers_percent: args.invalid_headers_percent,
                ..HeaderConfig::default()
            },
            logging: LoggingConfig {
                level: args.log_level,
                log_file: Some(args.log).filter(|path| !path.is_empty()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = ClientConfig::from(Args::parse());

    // Flushes the log file when dropped
    let _guard = init_tracing(&config.logging)?;

    let generator = LoadGenerator::new(config)?;

    let cancel = generator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Interrupted, finishing in-flight requests...");
            cancel.cancel();
        }
    });

    let report = generator.run().await?;
    println!("{}", report);

    Ok(())
}
