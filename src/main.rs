//! Repository forwarding proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ routing (mount) ──▶ forwarding engine
//!                                                            │
//!                                     transform (path, headers, multipart)
//!                                                            │
//!                                                            ▼
//!     Client Response                                    forwarder ──────▶ Backend
//!     ◀────────────── response streamer ◀── redirect / 304 ◀─┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use repo_proxy::config::{load_config, with_bind_address};
use repo_proxy::lifecycle::signals::wait_for_signal;
use repo_proxy::observability::{logging, metrics};
use repo_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "repo-proxy")]
#[command(about = "Forwarding proxy for backend repository services", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "repo-proxy.toml")]
    config: PathBuf,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(bind) = cli.bind {
        config = with_bind_address(config, bind)?;
    }

    if cli.check {
        println!(
            "Configuration OK: {} mount(s), listening on {}",
            config.mounts.len(),
            config.listener.bind_address
        );
        return Ok(());
    }

    logging::init_logging(&config.observability);

    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        mounts = config.mounts.len(),
        "repo-proxy v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
