//! Purchase attempt state machine.
//!
//! One [`AdoptionFlow`] owns one attempt at a time. The lifecycle is a
//! strict forward-only FSM:
//!
//! ```text
//! Idle ──► Validating ──► Submitting ──► Success
//!   │           │              └───────► Error
//!   │           └► Idle (invalid amount)
//!   └──► Unauthenticated
//! ```
//!
//! `Success`, `Error`, and `Unauthenticated` are terminal; only an external
//! reopen ([`AdoptionFlow::open`]) produces a fresh `Idle` attempt.
//! `Submitting` doubles as the mutual-exclusion mechanism: a confirm press
//! observed while a request is in flight is a no-op, never a queued retry.
//!
//! Every attempt carries a generation number. A network result (or dismiss
//! timer) that resolves after the surface was closed or reopened compares
//! generations and lands nowhere — no state change, no store write, no
//! notification.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::auth::{self, Session};
use crate::client::{PurchaseApi, PurchaseFailure, PurchaseOutcome, PurchaseReceipt};
use crate::config::FlowConfig;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::store::{TokenEntry, TokenStore, POINTS_PER_TOKEN};
use crate::validator;

/// Toast shown on a confirmed adoption.
pub const SUCCESS_MESSAGE: &str = "Tree adopted successfully!";
/// Label on the confirm control while a request is in flight.
pub const PROCESSING_LABEL: &str = "Processing...";
/// Label on the confirm control while idle.
pub const CONFIRM_LABEL: &str = "Confirm Purchase";
/// Species label used when the server omits `new_token`.
pub const DEFAULT_TOKEN_NAME: &str = "TREE TOKEN";

/// The surface opens with one token pre-filled.
const DEFAULT_AMOUNT: &str = "1";

/// Lifecycle state of the current attempt. Exactly one at any instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseState {
    /// Surface open, waiting for input.
    Idle,
    /// Confirm pressed; amount and session checks running.
    Validating,
    /// Request in flight. Entered at most once per attempt.
    Submitting,
    /// Endpoint confirmed the purchase; collection already updated.
    Success(PurchaseReceipt),
    /// Endpoint or transport failed; collection untouched.
    Error(PurchaseFailure),
    /// Confirm pressed without a valid session.
    Unauthenticated,
}

impl PurchaseState {
    /// Terminal states transition only on an external reopen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseState::Success(_) | PurchaseState::Error(_) | PurchaseState::Unauthenticated
        )
    }
}

#[derive(Debug)]
struct Attempt {
    generation: u64,
    surface_open: bool,
    project_id: String,
    amount_raw: String,
    state: PurchaseState,
}

impl Attempt {
    fn fresh(generation: u64, project_id: &str) -> Self {
        Attempt {
            generation,
            surface_open: true,
            project_id: project_id.to_string(),
            amount_raw: DEFAULT_AMOUNT.to_string(),
            state: PurchaseState::Idle,
        }
    }
}

/// Drives one purchase attempt against a [`PurchaseApi`].
pub struct AdoptionFlow<A: PurchaseApi> {
    api: Arc<A>,
    store: TokenStore,
    sink: Arc<dyn NotificationSink>,
    session: Session,
    config: FlowConfig,
    attempt: Arc<Mutex<Attempt>>,
}

impl<A: PurchaseApi + 'static> AdoptionFlow<A> {
    pub fn new(
        api: Arc<A>,
        store: TokenStore,
        sink: Arc<dyn NotificationSink>,
        session: Session,
        config: FlowConfig,
    ) -> Self {
        AdoptionFlow {
            api,
            store,
            sink,
            session,
            config,
            attempt: Arc::new(Mutex::new(Attempt {
                generation: 0,
                surface_open: false,
                project_id: String::new(),
                amount_raw: DEFAULT_AMOUNT.to_string(),
                state: PurchaseState::Idle,
            })),
        }
    }

    /// Open (or reopen) the adopt surface for `project_id`.
    ///
    /// Always produces a fresh `Idle` attempt, whatever the previous one
    /// reached; a request still in flight for the old attempt is orphaned by
    /// the generation bump.
    pub fn open(&self, project_id: &str) {
        let mut attempt = self.lock();
        let generation = attempt.generation + 1;
        debug!("Opening adopt surface for project {project_id} (attempt {generation})");
        *attempt = Attempt::fresh(generation, project_id);
    }

    /// Close the surface. Any in-flight request becomes inert.
    pub fn close(&self) {
        let mut attempt = self.lock();
        attempt.generation += 1;
        attempt.surface_open = false;
    }

    /// Update the amount input. Revalidates; no lifecycle transition.
    pub fn edit_amount(&self, raw: &str) {
        let mut attempt = self.lock();
        attempt.amount_raw = raw.to_string();
    }

    pub fn is_open(&self) -> bool {
        self.lock().surface_open
    }

    pub fn state(&self) -> PurchaseState {
        self.lock().state.clone()
    }

    pub fn amount_valid(&self) -> bool {
        validator::validate(&self.lock().amount_raw).valid
    }

    /// Whether the confirm control accepts a press right now.
    pub fn confirm_enabled(&self) -> bool {
        let attempt = self.lock();
        attempt.surface_open
            && matches!(attempt.state, PurchaseState::Idle)
            && validator::validate(&attempt.amount_raw).valid
    }

    /// Current label of the confirm control.
    pub fn confirm_label(&self) -> &'static str {
        match self.lock().state {
            PurchaseState::Submitting | PurchaseState::Validating => PROCESSING_LABEL,
            _ => CONFIRM_LABEL,
        }
    }

    /// Handle a press of the confirm control.
    ///
    /// No-op unless the surface is open and the attempt is `Idle` — this is
    /// the single-flight guarantee. An invalid amount keeps the attempt
    /// `Idle` (the control should already be disabled; the guard stays
    /// regardless). A missing session is terminal `Unauthenticated`.
    /// Otherwise exactly one request is issued and awaited.
    pub async fn confirm(&self) -> PurchaseState {
        let (generation, project_id, amount) = {
            let mut attempt = self.lock();
            if !attempt.surface_open || !matches!(attempt.state, PurchaseState::Idle) {
                debug!("Confirm ignored in state {:?}", attempt.state);
                return attempt.state.clone();
            }

            attempt.state = PurchaseState::Validating;
            let amount = match validator::parse_amount(&attempt.amount_raw) {
                Some(n) => n,
                None => {
                    attempt.state = PurchaseState::Idle;
                    return PurchaseState::Idle;
                }
            };

            if !auth::can_submit(&self.session) {
                info!("Purchase blocked: no authenticated session");
                attempt.state = PurchaseState::Unauthenticated;
                return PurchaseState::Unauthenticated;
            }

            attempt.state = PurchaseState::Submitting;
            (attempt.generation, attempt.project_id.clone(), amount)
        };

        info!("Submitting purchase of {amount} token(s) for project {project_id}");
        let outcome = self
            .api
            .submit(&project_id, amount, self.config.request_timeout)
            .await;

        self.settle(generation, &project_id, outcome)
    }

    /// Apply a request outcome to the attempt it belongs to.
    ///
    /// The store write happens under the attempt lock so a reopen cannot
    /// slip between the generation check and the append. The sink fires
    /// after the guard drops, so an implementation is free to call back
    /// into the flow.
    fn settle(&self, generation: u64, project_id: &str, outcome: PurchaseOutcome) -> PurchaseState {
        let notification;
        let state = {
            let mut attempt = self.lock();
            if attempt.generation != generation {
                debug!("Discarding result for superseded attempt {generation}");
                return attempt.state.clone();
            }

            match outcome {
                PurchaseOutcome::Confirmed(receipt) => {
                    let entries = collection_entries(&receipt, project_id);
                    let points = receipt.tokens_purchased as u64 * POINTS_PER_TOKEN;
                    self.store.append(&self.session.user_id, entries, points);
                    notification = Notification {
                        kind: NotificationKind::Success,
                        message: SUCCESS_MESSAGE.to_string(),
                    };
                    info!(
                        "Purchase confirmed (tx {}): {} token(s)",
                        receipt.transaction_id, receipt.tokens_purchased
                    );
                    attempt.state = PurchaseState::Success(receipt);
                }
                PurchaseOutcome::Failed(failure) => {
                    notification = Notification {
                        kind: NotificationKind::Error,
                        message: failure.message.clone(),
                    };
                    info!("Purchase failed ({:?}): {}", failure.kind, failure.message);
                    attempt.state = PurchaseState::Error(failure);
                }
            }
            attempt.state.clone()
        };

        if matches!(state, PurchaseState::Success(_)) {
            self.schedule_dismiss(generation);
        }
        self.sink.notify(notification);
        state
    }

    /// After a success the surface dismisses itself; errors stay up so the
    /// user can retry from a reopened surface.
    fn schedule_dismiss(&self, generation: u64) {
        let attempt = Arc::clone(&self.attempt);
        let delay = self.config.success_dismiss;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut attempt = attempt.lock().expect("attempt lock poisoned");
            if attempt.generation == generation
                && matches!(attempt.state, PurchaseState::Success(_))
            {
                debug!("Auto-dismissing adopt surface after success");
                attempt.surface_open = false;
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Attempt> {
        self.attempt.lock().expect("attempt lock poisoned")
    }
}

/// Expand a receipt into dashboard entries, one per purchased token.
fn collection_entries(receipt: &PurchaseReceipt, project_id: &str) -> Vec<TokenEntry> {
    let (name, project) = match &receipt.new_token {
        Some(token) => (token.name.clone(), token.project_id.clone()),
        None => (DEFAULT_TOKEN_NAME.to_string(), project_id.to_string()),
    };
    (0..receipt.tokens_purchased)
        .map(|_| TokenEntry {
            name: name.clone(),
            project_id: project.clone(),
            acquired_at: chrono::Utc::now(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::client::{FailureKind, NewToken};
    use crate::notify::RecordingSink;

    /// In-process endpoint double: fixed outcome, optional latency,
    /// counts issued requests.
    struct FakeApi {
        outcome: PurchaseOutcome,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeApi {
        fn confirmed(tokens_purchased: u32, new_token: Option<NewToken>) -> Self {
            FakeApi {
                outcome: PurchaseOutcome::Confirmed(PurchaseReceipt {
                    transaction_id: "test-tx-123".to_string(),
                    tokens_purchased,
                    new_token,
                }),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failed(kind: FailureKind, message: &str) -> Self {
            FakeApi {
                outcome: PurchaseOutcome::Failed(PurchaseFailure {
                    kind,
                    message: message.to_string(),
                }),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl PurchaseApi for FakeApi {
        async fn submit(&self, _: &str, _: u32, _: Duration) -> PurchaseOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            self.outcome.clone()
        }
    }

    fn roble() -> Option<NewToken> {
        Some(NewToken {
            name: "ROBLE".to_string(),
            project_id: "1".to_string(),
        })
    }

    fn flow_with(api: FakeApi) -> (Arc<AdoptionFlow<FakeApi>>, TokenStore, Arc<RecordingSink>) {
        let store = TokenStore::new();
        let sink = Arc::new(RecordingSink::new());
        let flow = AdoptionFlow::new(
            Arc::new(api),
            store.clone(),
            sink.clone(),
            Session::authenticated("michael"),
            FlowConfig {
                success_dismiss: Duration::from_millis(30),
                ..FlowConfig::default()
            },
        );
        (Arc::new(flow), store, sink)
    }

    #[tokio::test]
    async fn success_appends_tokens_and_notifies_once() {
        let (flow, store, sink) = flow_with(FakeApi::confirmed(1, roble()));
        flow.open("1");
        flow.edit_amount("2");

        let state = flow.confirm().await;
        assert!(matches!(state, PurchaseState::Success(_)));

        let tokens = store.list("michael");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].name, "ROBLE");
        assert_eq!(store.points_balance("michael"), POINTS_PER_TOKEN);

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationKind::Success);
        assert_eq!(received[0].message, SUCCESS_MESSAGE);
    }

    #[tokio::test]
    async fn multi_token_receipt_appends_each_entry() {
        let (flow, store, _) = flow_with(FakeApi::confirmed(3, roble()));
        flow.open("1");

        flow.confirm().await;

        assert_eq!(store.list("michael").len(), 3);
        assert_eq!(store.points_balance("michael"), 3 * POINTS_PER_TOKEN);
    }

    #[tokio::test]
    async fn error_leaves_store_untouched_and_surface_open() {
        let (flow, store, sink) = flow_with(FakeApi::failed(
            FailureKind::Rejected,
            "Insufficient funds",
        ));
        flow.open("1");

        let state = flow.confirm().await;
        match state {
            PurchaseState::Error(failure) => {
                assert_eq!(failure.kind, FailureKind::Rejected);
                assert_eq!(failure.message, "Insufficient funds");
            }
            other => panic!("expected Error, got {other:?}"),
        }

        assert!(store.list("michael").is_empty());
        assert_eq!(store.points_balance("michael"), 0);
        assert!(flow.is_open(), "errors must not dismiss the surface");

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationKind::Error);
        assert_eq!(received[0].message, "Insufficient funds");
    }

    #[tokio::test]
    async fn repeated_confirm_issues_a_single_request() {
        let (flow, _, _) =
            flow_with(FakeApi::confirmed(1, roble()).with_delay(Duration::from_millis(80)));
        flow.open("1");

        let first = tokio::spawn({
            let flow = Arc::clone(&flow);
            async move { flow.confirm().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // While the first request is in flight the control is disabled and
        // relabelled; pressing again must change nothing.
        assert_eq!(flow.state(), PurchaseState::Submitting);
        assert!(!flow.confirm_enabled());
        assert_eq!(flow.confirm_label(), PROCESSING_LABEL);
        let second = flow.confirm().await;
        assert_eq!(second, PurchaseState::Submitting);

        first.await.expect("confirm task panicked");
        assert_eq!(flow.api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_amount_confirm_is_a_noop() {
        let (flow, _, sink) = flow_with(FakeApi::confirmed(1, roble()));
        flow.open("1");
        flow.edit_amount("0");

        assert!(!flow.confirm_enabled());
        let state = flow.confirm().await;
        assert_eq!(state, PurchaseState::Idle);
        assert_eq!(flow.api.calls.load(Ordering::SeqCst), 0);
        assert!(sink.received().is_empty());
    }

    #[tokio::test]
    async fn unauthenticated_confirm_is_terminal() {
        let store = TokenStore::new();
        let sink = Arc::new(RecordingSink::new());
        let flow = AdoptionFlow::new(
            Arc::new(FakeApi::confirmed(1, roble())),
            store.clone(),
            sink.clone(),
            Session::anonymous(),
            FlowConfig::default(),
        );
        flow.open("1");

        let state = flow.confirm().await;
        assert_eq!(state, PurchaseState::Unauthenticated);
        assert!(state.is_terminal());
        assert_eq!(flow.api.calls.load(Ordering::SeqCst), 0);
        assert!(sink.received().is_empty());

        // Terminal until reopened.
        assert_eq!(flow.confirm().await, PurchaseState::Unauthenticated);
        flow.open("1");
        assert_eq!(flow.state(), PurchaseState::Idle);
    }

    #[tokio::test]
    async fn reopen_resets_after_terminal_state() {
        let (flow, _, _) = flow_with(FakeApi::failed(FailureKind::Rejected, "Server error"));
        flow.open("1");
        flow.confirm().await;
        assert!(flow.state().is_terminal());

        flow.open("1");
        assert_eq!(flow.state(), PurchaseState::Idle);
        assert!(flow.confirm_enabled(), "default amount keeps confirm enabled");
        assert_eq!(flow.confirm_label(), CONFIRM_LABEL);
    }

    #[tokio::test]
    async fn late_result_after_reopen_is_discarded() {
        let (flow, store, sink) =
            flow_with(FakeApi::confirmed(1, roble()).with_delay(Duration::from_millis(60)));
        flow.open("1");

        let pending = tokio::spawn({
            let flow = Arc::clone(&flow);
            async move { flow.confirm().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Reopen mid-flight: the outstanding request now belongs to a dead
        // generation.
        flow.open("1");

        let settled = pending.await.expect("confirm task panicked");
        assert_eq!(settled, PurchaseState::Idle);
        assert_eq!(flow.state(), PurchaseState::Idle);
        assert!(store.list("michael").is_empty());
        assert!(sink.received().is_empty());
    }

    #[tokio::test]
    async fn late_result_after_close_is_discarded() {
        let (flow, store, _) =
            flow_with(FakeApi::confirmed(1, roble()).with_delay(Duration::from_millis(60)));
        flow.open("1");

        let pending = tokio::spawn({
            let flow = Arc::clone(&flow);
            async move { flow.confirm().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        flow.close();

        pending.await.expect("confirm task panicked");
        assert!(store.list("michael").is_empty());
        assert!(!flow.is_open());
    }

    #[tokio::test]
    async fn success_auto_dismisses_but_error_does_not() {
        let (flow, _, _) = flow_with(FakeApi::confirmed(1, roble()));
        flow.open("1");
        flow.confirm().await;
        assert!(flow.is_open(), "surface stays up during the display delay");
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!flow.is_open(), "success dismisses after the delay");

        let (flow, _, _) = flow_with(FakeApi::failed(FailureKind::Transport, "connection reset"));
        flow.open("1");
        flow.confirm().await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(flow.is_open(), "errors never auto-dismiss");
    }

    /// Sink that reads the flow back while handling a notification, the way
    /// a toast component refreshing from current state would.
    #[derive(Default)]
    struct ReentrantSink {
        flow: Mutex<Option<Arc<AdoptionFlow<FakeApi>>>>,
        observed: Mutex<Vec<PurchaseState>>,
    }

    impl NotificationSink for ReentrantSink {
        fn notify(&self, _: Notification) {
            let flow = self.flow.lock().expect("sink poisoned");
            if let Some(flow) = flow.as_ref() {
                self.observed
                    .lock()
                    .expect("sink poisoned")
                    .push(flow.state());
            }
        }
    }

    #[tokio::test]
    async fn sink_may_read_flow_state_during_notify() {
        let sink = Arc::new(ReentrantSink::default());
        let flow = Arc::new(AdoptionFlow::new(
            Arc::new(FakeApi::confirmed(1, roble())),
            TokenStore::new(),
            sink.clone(),
            Session::authenticated("michael"),
            FlowConfig::default(),
        ));
        *sink.flow.lock().expect("sink poisoned") = Some(Arc::clone(&flow));

        flow.open("1");
        let state = flow.confirm().await;
        assert!(matches!(state, PurchaseState::Success(_)));

        // The re-entrant read saw the already-settled state.
        let observed = sink.observed.lock().expect("sink poisoned");
        assert_eq!(observed.len(), 1);
        assert!(matches!(observed[0], PurchaseState::Success(_)));
    }

    #[tokio::test]
    async fn receipt_without_new_token_uses_placeholder_name() {
        let (flow, store, _) = flow_with(FakeApi::confirmed(1, None));
        flow.open("7");
        flow.confirm().await;

        let tokens = store.list("michael");
        assert_eq!(tokens[0].name, DEFAULT_TOKEN_NAME);
        assert_eq!(tokens[0].project_id, "7");
    }
}
