//! Minimal backend for trying the load balancer locally.
//!
//! Serves `GET /health` with 200 and answers every other path with the
//! `BACKEND_RESPONSE` environment variable.

use std::net::SocketAddr;
use axum::{Router, http::{Method, Uri}, routing::get};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "demo-backend")]
#[command(about = "Demo upstream for l7lb", long_about = None)]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demo_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let response = std::env::var("BACKEND_RESPONSE").unwrap_or_else(|_| "Hello from backend!".to_string());

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .fallback(move |method: Method, uri: Uri| {
            let response = response.clone();
            async move {
                tracing::info!(method = %method, query = uri.query().unwrap_or(""), "Received request");
                response
            }
        });

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Backend server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
