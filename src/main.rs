use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use msgproxy::backend::BackendTuning;
use msgproxy::config::ProxyConfig;
use msgproxy::state::ProxyState;

/// Replicated-backend messaging proxy.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML config file. Defaults to `$MSGPROXY_CONFIG` or
    /// `/etc/msgproxy/msgproxy.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `proxy.port` from the config file.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "msgproxy starting");

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var("MSGPROXY_CONFIG").ok().map(PathBuf::from));

    let mut config = match ProxyConfig::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(host = %config.host, port = config.port, "config loaded");

    let state = ProxyState::with_backend_tuning(BackendTuning {
        connect_timeout: config.backend_connect_timeout,
        read_timeout: config.backend_read_timeout,
        ack_retry_count: config.ack_retry_count,
        ack_retry_backoff: config.ack_retry_backoff,
    });
    if let Err(e) = msgproxy::server::run(state, &config.host, config.port, config.heartbeat_interval).await {
        eprintln!("FATAL: proxy server error: {}", e);
        std::process::exit(1);
    }
}
