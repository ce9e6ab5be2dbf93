//! Minimal backend used by the integration tests: serves a fixed body on
//! every path and a healthcheck endpoint that can be told to stay unhealthy
//! for the first N probes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "demo-child")]
#[command(about = "Test backend server with a controllable healthcheck")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Response body for every non-healthcheck path
    #[arg(long, default_value = "OK")]
    content: String,

    /// Healthcheck path
    #[arg(long, default_value = "/heathz")]
    healthcheck: String,

    /// Number of healthcheck probes to answer 503 before turning healthy
    #[arg(long, default_value = "0")]
    healthy_after: u64,
}

struct AppState {
    content: String,
    healthy_after: u64,
    probes: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let state = Arc::new(AppState {
        content: args.content,
        healthy_after: args.healthy_after,
        probes: AtomicU64::new(0),
    });

    let app = Router::new()
        .route(&args.healthcheck, get(health_handler))
        .fallback(content_handler)
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    tracing::info!(%addr, "demo child listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let seen = state.probes.fetch_add(1, Ordering::SeqCst);
    if seen < state.healthy_after {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn content_handler(State(state): State<Arc<AppState>>) -> String {
    format!("{}\n", state.content)
}
