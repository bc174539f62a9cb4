mod bootstrap;
mod chatbot;
mod health;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chatgate_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{Application, BootstrapError};

#[derive(Debug, Parser)]
#[command(
    name = "chatgate-server",
    version,
    about = "Multi-provider chat gateway with failover, caching and rate limiting",
    after_help = "Examples:\n  chatgate-server\n  chatgate-server --config config/chatgate.toml --port 9000"
)]
struct Args {
    #[arg(long, help = "Path to a TOML config file (must exist when given)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Override server.bind_address")]
    bind_address: Option<String>,
    #[arg(long, help = "Override server.port")]
    port: Option<u16>,
    #[arg(long, help = "Override logging.level (trace|debug|info|warn|error)")]
    log_level: Option<String>,
}

impl Args {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                bind_address: self.bind_address,
                port: self.port,
                log_level: self.log_level,
                ..ConfigOverrides::default()
            },
        }
    }
}

fn init_logging(config: &AppConfig) {
    use chatgate_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.trim().to_ascii_lowercase()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Args::parse()).await
}

async fn run(args: Args) -> Result<()> {
    // Config first so logging is configured before anything else emits events.
    let config = AppConfig::load(args.load_options())?;
    init_logging(&config);

    let Application { config, state, usage_observer } =
        bootstrap::bootstrap_with_config(config).await?;

    let address = config.server.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| BootstrapError::Bind { address: address.clone(), source })?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "chatgate-server listening"
    );

    let app = bootstrap::router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "draining usage queue"
    );

    let drain = Duration::from_secs(config.server.graceful_shutdown_secs);
    if tokio::time::timeout(drain, usage_observer).await.is_err() {
        tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            drain_secs = drain.as_secs(),
            "usage observer did not drain in time"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c; shutting down"
        );
    }
}
