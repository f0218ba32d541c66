//! Purchase endpoint client — issues a single `buy-token` request and maps
//! the response into a typed outcome.
//!
//! ## Failure mapping
//!
//! * 401 → [`FailureKind::Unauthorized`] — the session expired after the
//!   pre-flight gate passed.
//! * Any other non-2xx → [`FailureKind::Rejected`], message taken from the
//!   server's `{"error": …}` payload.
//! * Connection abort/reset before a response → [`FailureKind::Transport`].
//! * No response within the caller's ceiling → [`FailureKind::Timeout`].
//!   The race is decided by `tokio::time::timeout`: the losing request
//!   future is dropped, so a late server response cannot surface.
//!
//! Exactly one network call is issued per invocation. Retrying is a new
//! user-initiated attempt, never automatic.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FlowConfig;
use crate::errors::Result;

// ─────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct BuyTokenRequest<'a> {
    project_id: &'a str,
    amount: u32,
}

#[derive(Debug, Deserialize)]
struct BuyTokenResponse {
    success: bool,
    transaction_id: Option<String>,
    tokens_purchased: Option<u32>,
    new_token: Option<NewToken>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Token metadata attached to a successful purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewToken {
    pub name: String,
    pub project_id: String,
}

// ─────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────

/// Why a purchase attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Server-side business rejection (e.g. insufficient funds).
    Rejected,
    /// 401 — the session expired mid-flight.
    Unauthorized,
    /// Connection aborted or reset before a response arrived.
    Transport,
    /// No response within the configured ceiling.
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// A confirmed purchase as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub transaction_id: String,
    pub tokens_purchased: u32,
    pub new_token: Option<NewToken>,
}

/// Tagged result of one purchase request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Confirmed(PurchaseReceipt),
    Failed(PurchaseFailure),
}

impl PurchaseOutcome {
    fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        PurchaseOutcome::Failed(PurchaseFailure {
            kind,
            message: message.into(),
        })
    }
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

/// Seam between the state machine and the transaction endpoint.
///
/// The machine only ever sees a [`PurchaseOutcome`]; transport details stay
/// behind this trait so tests can drive the machine with an in-process fake.
#[async_trait]
pub trait PurchaseApi: Send + Sync {
    async fn submit(&self, project_id: &str, amount: u32, timeout: Duration) -> PurchaseOutcome;
}

/// Real HTTP client for the `POST /token/buy-token` endpoint.
#[derive(Debug, Clone)]
pub struct HttpPurchaseClient {
    http: Client,
    base_url: String,
}

impl HttpPurchaseClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(HttpPurchaseClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &FlowConfig) -> Result<Self> {
        Self::new(config.api_url.clone())
    }

    async fn submit_inner(&self, project_id: &str, amount: u32) -> PurchaseOutcome {
        let url = format!("{}/token/buy-token", self.base_url);
        let body = BuyTokenRequest { project_id, amount };

        let response = match self.http.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Purchase request failed before a response: {e}");
                let kind = if e.is_timeout() {
                    FailureKind::Timeout
                } else {
                    FailureKind::Transport
                };
                return PurchaseOutcome::failed(kind, e.to_string());
            }
        };

        let status = response.status();
        if status.is_success() {
            match response.json::<BuyTokenResponse>().await {
                Ok(ok) if ok.success => {
                    debug!(
                        "Purchase confirmed: tx={:?} tokens={:?}",
                        ok.transaction_id, ok.tokens_purchased
                    );
                    PurchaseOutcome::Confirmed(PurchaseReceipt {
                        transaction_id: ok.transaction_id.unwrap_or_default(),
                        // The endpoint sometimes answers a bare {"success":true}.
                        tokens_purchased: ok.tokens_purchased.unwrap_or(1),
                        new_token: ok.new_token,
                    })
                }
                // A 200 whose payload says success:false is still a rejection.
                Ok(ok) => {
                    let message = ok.error.unwrap_or_else(|| "Purchase failed".to_string());
                    warn!("Purchase declined in a 200 response: {message}");
                    PurchaseOutcome::failed(FailureKind::Rejected, message)
                }
                Err(e) => PurchaseOutcome::failed(FailureKind::Transport, e.to_string()),
            }
        } else {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("Purchase failed ({status})"));
            warn!("Purchase rejected with {status}: {message}");

            let kind = if status == StatusCode::UNAUTHORIZED {
                FailureKind::Unauthorized
            } else {
                FailureKind::Rejected
            };
            PurchaseOutcome::failed(kind, message)
        }
    }
}

#[async_trait]
impl PurchaseApi for HttpPurchaseClient {
    /// Issue exactly one purchase request, racing it against `timeout`.
    ///
    /// Whichever settles first wins; if the timer fires, the request future
    /// is dropped and a late response (even a 200) has nothing to land on.
    async fn submit(&self, project_id: &str, amount: u32, timeout: Duration) -> PurchaseOutcome {
        match tokio::time::timeout(timeout, self.submit_inner(project_id, amount)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Purchase request exceeded {}ms ceiling", timeout.as_millis());
                PurchaseOutcome::failed(
                    FailureKind::Timeout,
                    format!("No response within {}ms", timeout.as_millis()),
                )
            }
        }
    }
}
