//! l7lb: health-aware Layer-7 load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──TLS/HTTP──▶ http::server ──▶ security::rate_limit ──▶ routing::RouteManager
//!                                                                         │
//!                                                                         ▼
//!                                           load_balancer::LoadBalancer (per group instance)
//!                                            │ healthy set ◀── registry ◀── health::HealthChecker
//!                                            ▼                                     │
//!     Client ◀──── streamed response ──── upstream client ──▶ Backend ◀── probes ──┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use clap::Parser;

use l7lb::config::load_config;
use l7lb::http::HttpServer;
use l7lb::lifecycle::{Shutdown, build_topology, signals};
use l7lb::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "l7lb")]
#[command(about = "Health-aware Layer-7 HTTP(S) load balancer", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/l7lb.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = %cli.config.display(), "l7lb starting");

    if cli.check {
        tracing::info!(
            groups = config.backend_groups.len(),
            routes = config.routes.len(),
            "Configuration is valid"
        );
        return Ok(());
    }

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let topology = build_topology(&config)?;
    let workers = topology.health_checker.start(shutdown.subscribe());
    signals::spawn_signal_handler(shutdown.clone());

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let server = HttpServer::new(config, topology.routes.clone(), shutdown.token());
    let result = server.serve().await;

    shutdown.trigger();
    for worker in workers {
        let _ = worker.await;
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
