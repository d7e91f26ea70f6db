use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use embed_proxy::config::load_effective_config;
use embed_proxy::lifecycle::{shutdown_signal, Shutdown};
use embed_proxy::observability::{logging, metrics};
use embed_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "embed-proxy")]
#[command(about = "Reverse proxy that makes third-party pages embeddable", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let effective = load_effective_config(&cli.config)?;

    logging::init_logging(&effective.config.observability);
    tracing::info!("embed-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    effective.log_warnings(&cli.config);

    let mut config = effective.config;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    tracing::info!(
        config_path = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        sites = config.portal.sites.len(),
        allow_all_hosts = config.allowlist.allow_all,
        rate_limit_max = config.rate_limit.max_requests,
        rate_limit_window_secs = config.rate_limit.window_secs,
        upstream_timeout_secs = config.upstream.timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
