//! Task feed server entry point
//!
//! Streams mock task events to any channel client that subscribes on `/ws`.

use clap::Parser;
use std::net::SocketAddr;

use feedserver::{FeedServer, FeedServerConfig, FeedServerError, FeedServerResult};
use shared::{logging, Component};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "task-feed-server")]
#[command(about = "Mock task feed speaking the task event contract over WebSocket")]
struct Args {
    /// Port for the feed and control API
    #[arg(long, default_value = "8765")]
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Progress tick in milliseconds
    #[arg(long, default_value = "1000")]
    tick_ms: u64,

    /// Fixed progress step per tick (random when unset)
    #[arg(long)]
    step: Option<f64>,

    /// Seed for reproducible streams
    #[arg(long)]
    seed: Option<u64>,

    /// Emit error events now and then
    #[arg(long)]
    inject_errors: bool,

    #[arg(long, default_value = "0.1")]
    error_probability: f64,

    /// Bearer token required by the control API (falls back to TASK_API_TOKEN)
    #[arg(long)]
    api_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> FeedServerResult<()> {
    let args = Args::parse();
    let _ = dotenv::dotenv();

    logging::init_tracing(Component::FeedServer, Some(&args.log_level));

    let bind: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| FeedServerError::Config(format!("Invalid bind address: {}", e)))?;

    let mut config = FeedServerConfig {
        bind,
        api_token: args.api_token.or_else(|| std::env::var("TASK_API_TOKEN").ok()),
        ..Default::default()
    };
    config.source.tick_interval_ms = args.tick_ms;
    config.source.progress_step = args.step;
    config.source.seed = args.seed;
    config.source.inject_errors = args.inject_errors;
    config.source.error_probability = args.error_probability;
    config.validate()?;

    tracing::info!(
        bind = %config.bind,
        tick_ms = config.source.tick_interval_ms,
        inject_errors = config.source.inject_errors,
        auth = config.api_token.is_some(),
        "🌐 Feed server configured"
    );

    let server = FeedServer::new(config);
    if let Err(e) = server.run().await {
        logging::log_error(Component::FeedServer, "Feed server", &e);
        return Err(e);
    }

    logging::log_success(Component::FeedServer, "Feed server stopped gracefully");
    Ok(())
}
