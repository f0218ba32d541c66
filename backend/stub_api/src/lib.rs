//! Configurable stand-in for the TreeByte purchase endpoint.
//!
//! The real backend is out of scope for this repository; this crate makes
//! its consumed interface runnable. One [`Behavior`] per server covers the
//! cases the frontend exercises: confirmed purchase, business rejection,
//! session expiry, and an artificially slow response for processing-state
//! and timeout testing. Each server counts the requests it receives so
//! callers can assert single-flight behavior.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

// ─────────────────────────────────────────────────────────
// Behaviors
// ─────────────────────────────────────────────────────────

/// How the stub answers `POST /token/buy-token`.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// 200 with a purchase receipt.
    Success {
        transaction_id: String,
        tokens_purchased: u32,
        /// `(name, project_id)` of the token to attach, if any.
        new_token: Option<(String, String)>,
    },
    /// 200 whose payload reports `success: false` — some backends decline
    /// this way instead of with a 4xx.
    Declined { error: String },
    /// Non-200 with an `{"error"}` payload (400 insufficient funds,
    /// 401 session expiry, 500 server error, …).
    Reject { status: u16, error: String },
    /// Sleep, then answer with the inner behavior.
    Delay { millis: u64, then: Box<Behavior> },
}

impl Behavior {
    /// Canonical happy-path response used by most tests.
    pub fn adopted(name: &str, project_id: &str) -> Self {
        Behavior::Success {
            transaction_id: "test-tx-123".to_string(),
            tokens_purchased: 1,
            new_token: Some((name.to_string(), project_id.to_string())),
        }
    }

    pub fn declined(error: &str) -> Self {
        Behavior::Declined {
            error: error.to_string(),
        }
    }

    pub fn insufficient_funds() -> Self {
        Behavior::Reject {
            status: 400,
            error: "Insufficient funds".to_string(),
        }
    }

    pub fn session_expired() -> Self {
        Behavior::Reject {
            status: 401,
            error: "User not authenticated".to_string(),
        }
    }

    pub fn slow(millis: u64, then: Behavior) -> Self {
        Behavior::Delay {
            millis,
            then: Box::new(then),
        }
    }
}

pub struct StubState {
    pub behavior: Behavior,
    pub hits: AtomicUsize,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct BuyTokenRequest {
    project_id: String,
    amount: u32,
}

/// `GET /health`
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// `POST /token/buy-token`
async fn buy_token(
    State(state): State<Arc<StubState>>,
    Json(request): Json<BuyTokenRequest>,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    info!(
        "Stub purchase request: project {} x{}",
        request.project_id, request.amount
    );

    let mut behavior = &state.behavior;
    if let Behavior::Delay { millis, then } = behavior {
        tokio::time::sleep(Duration::from_millis(*millis)).await;
        behavior = then.as_ref();
    }

    match behavior {
        Behavior::Success {
            transaction_id,
            tokens_purchased,
            new_token,
        } => {
            let mut body = json!({
                "success": true,
                "transaction_id": transaction_id,
                "tokens_purchased": tokens_purchased,
            });
            if let Some((name, project_id)) = new_token {
                body["new_token"] = json!({ "name": name, "project_id": project_id });
            }
            (StatusCode::OK, Json(body)).into_response()
        }
        Behavior::Declined { error } => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": error })),
        )
            .into_response(),
        Behavior::Reject { status, error } => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST);
            (status, Json(json!({ "error": error }))).into_response()
        }
        // Nested delays are not a thing; answer the inner behavior directly.
        Behavior::Delay { .. } => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub fn router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/token/buy-token", post(buy_token))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// In-process server
// ─────────────────────────────────────────────────────────

/// A stub server bound to an ephemeral local port.
pub struct StubServer {
    pub addr: SocketAddr,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubServer {
    /// Bind `127.0.0.1:0` and serve `behavior` until dropped.
    pub async fn spawn(behavior: Behavior) -> std::io::Result<Self> {
        let state = Arc::new(StubState {
            behavior,
            hits: AtomicUsize::new(0),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(StubServer {
            addr,
            state,
            handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of purchase requests received so far.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
