//! Standalone stub endpoint — entry point.
//!
//! Serves the purchase endpoint with a fixed happy-path behavior so the
//! frontend can be developed against something local. `STUB_PORT` picks the
//! port, `RUST_LOG` the verbosity.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stub_api::{router, Behavior, StubState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let _ = dotenvy::dotenv();

    let port: u16 = std::env::var("STUB_PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()?;

    let state = Arc::new(StubState {
        behavior: Behavior::adopted("ROBLE", "1"),
        hits: AtomicUsize::new(0),
    });

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{port}");
    info!("Stub purchase endpoint listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
