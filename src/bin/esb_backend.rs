use std::error::Error;
use std::net::SocketAddr;

use clap::Parser;

use esb_stress::backend::{MockEsb, MockEsbConfig};
use esb_stress::config::LoggingConfig;
use esb_stress::core::gateway::shutdown_signal;
use esb_stress::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "esb-backend")]
#[command(about = "Mock ESB backend issuing ibsession cookies")]
struct Args {
    #[arg(long, default_value_t = 8950)]
    port: u16,

    /// Reject messages that do not carry a live session cookie
    #[arg(long)]
    require_session: bool,

    /// Expire all sessions after this many accepted messages
    #[arg(long)]
    expire_every: Option<u64>,

    /// Delay before answering each message, in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let _guard = init_tracing(&LoggingConfig {
        level: args.log_level,
        log_file: None,
    })?;

    let esb = MockEsb::new(MockEsbConfig {
        require_session: args.require_session,
        expire_every: args.expire_every,
        response_delay_ms: args.delay_ms,
        ..MockEsbConfig::default()
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    esb.clone().serve(addr, shutdown_signal()).await?;

    tracing::info!(
        messages = esb.message_count(),
        accepted = esb.accepted_count(),
        sessions = esb.session_count(),
        "Mock ESB stopped"
    );
    Ok(())
}
