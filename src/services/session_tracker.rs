//! Trigger-session lifecycle tracker.
//!
//! State machine per trigger name: `None -> Pending -> Active -> Ended ->
//! Pending (new instance)`. One pending session exists per known trigger
//! name; at most one session is active globally. All map mutations are
//! serialized through a single lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::models::{
    AppSession, EventValue, LoadState, PaywallContent, PaywallSubsession, PresentationOutcome,
    ServerConfig, TransactionCount, TransactionOutcome, TransactionRecord, TransactionStatus,
    TriggerSession, MANUAL_PRESENT_TRIGGER,
};
use crate::domain::ports::EntitlementProvider;
use crate::services::delivery_queue::DeliveryQueue;

/// Picks the analytics outcome of a completed purchase.
pub fn transaction_outcome(
    is_non_recurring: bool,
    is_free_trial_available: bool,
) -> TransactionOutcome {
    if is_non_recurring {
        TransactionOutcome::NonRecurringProductPurchase
    } else if is_free_trial_available {
        TransactionOutcome::FreeTrialStart
    } else {
        TransactionOutcome::SubscriptionStart
    }
}

#[derive(Default)]
struct TrackerState {
    pending: HashMap<String, TriggerSession>,
    active: Option<TriggerSession>,
    /// Cumulative per-active-session transaction counters, reset at end.
    transaction_count: Option<TransactionCount>,
    /// Snapshot used when recreating pending sessions after an end.
    config_request_id: Option<String>,
    user_attributes: BTreeMap<String, EventValue>,
    app_session: AppSession,
}

/// Owns the pending/active trigger-session maps.
pub struct SessionTracker {
    state: Mutex<TrackerState>,
    queue: Arc<DeliveryQueue>,
    entitlements: Arc<dyn EntitlementProvider>,
}

impl SessionTracker {
    pub fn new(queue: Arc<DeliveryQueue>, entitlements: Arc<dyn EntitlementProvider>) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            queue,
            entitlements,
        }
    }

    /// Creates one pending session per trigger in the config, plus the
    /// synthetic manual-present trigger, and enqueues them all.
    pub async fn create_sessions(
        &self,
        config: &ServerConfig,
        user_attributes: BTreeMap<String, EventValue>,
        app_session: AppSession,
    ) {
        let is_subscribed = self.entitlements.is_subscribed().await;
        let mut state = self.state.lock().await;
        state.config_request_id = config.request_id.clone();
        state.user_attributes = user_attributes;
        state.app_session = app_session;

        let mut names: Vec<String> = config
            .triggers
            .iter()
            .map(|t| t.placement_name.clone())
            .collect();
        names.push(MANUAL_PRESENT_TRIGGER.to_string());

        for name in names {
            let session = TriggerSession::pending(
                &name,
                state.config_request_id.clone(),
                state.user_attributes.clone(),
                is_subscribed,
                vec![],
                state.app_session.clone(),
            );
            state.pending.insert(name, session);
        }
        tracing::debug!(count = state.pending.len(), "Created pending trigger sessions");

        let sessions: Vec<TriggerSession> = state.pending.values().cloned().collect();
        self.queue.enqueue_all(sessions).await;
    }

    /// Activates the pending session for `trigger_name`.
    ///
    /// A missing pending session is a no-op: a config refresh racing a
    /// presentation drops the stale activation instead of crashing. Holdout
    /// and no-match outcomes end the session immediately; a paywall outcome
    /// leaves it active for sub-phase tracking.
    ///
    /// Returns the id of the session that became active, if any.
    pub async fn activate_session(
        &self,
        trigger_name: &str,
        outcome: PresentationOutcome,
        paywall: Option<&PaywallContent>,
    ) -> Option<String> {
        let mut state = self.state.lock().await;
        let Some(mut session) = state.pending.remove(trigger_name) else {
            tracing::debug!(trigger_name, "No pending session to activate; dropping");
            return None;
        };

        // At most one active session: a displaced one is closed, not lost.
        if state.active.is_some() {
            self.end_locked(&mut state).await;
        }

        session.presentation_outcome = Some(outcome);
        if let Some(content) = paywall {
            session.paywall = Some(PaywallSubsession::new(&content.info.database_id));
            session.products.all_product_ids = content.product_ids.clone();
        }
        session.app_session = state.app_session.clone();

        let id = session.id.clone();
        state.active = Some(session);
        tracing::info!(trigger_name, ?outcome, "Activated trigger session");

        match outcome {
            PresentationOutcome::Holdout | PresentationOutcome::NoAudienceMatch => {
                self.end_locked(&mut state).await;
            }
            PresentationOutcome::Paywall => {
                self.enqueue_active(&mut state).await;
            }
        }
        Some(id)
    }

    /// Ends the active session. No-op when nothing is active.
    pub async fn end_session(&self) {
        let mut state = self.state.lock().await;
        self.end_locked(&mut state).await;
    }

    /// Id of the currently active session, for UI-layer correlation.
    pub async fn active_session_id(&self) -> Option<String> {
        self.state.lock().await.active.as_ref().map(|s| s.id.clone())
    }

    // -- Paywall sub-phase ---------------------------------------------------

    pub async fn track_paywall_open(&self) {
        let mut state = self.state.lock().await;
        if let Some(paywall) = state.active.as_mut().and_then(|s| s.paywall.as_mut()) {
            paywall.open_at = Some(chrono::Utc::now());
        }
        self.enqueue_active(&mut state).await;
    }

    /// Stamps the close and ends the session.
    pub async fn track_paywall_close(&self) {
        let mut state = self.state.lock().await;
        if let Some(paywall) = state.active.as_mut().and_then(|s| s.paywall.as_mut()) {
            paywall.close_at = Some(chrono::Utc::now());
        }
        self.end_locked(&mut state).await;
    }

    /// Guarded by paywall id so a concurrently preloading paywall cannot
    /// write into the active session's record.
    pub async fn track_webview_load(&self, paywall_id: &str, load_state: LoadState) {
        let mut state = self.state.lock().await;
        let Some(paywall) = Self::active_paywall(&mut state, paywall_id) else {
            return;
        };
        paywall.webview_loading.record(load_state);
        self.enqueue_active(&mut state).await;
    }

    pub async fn track_paywall_response_load(
        &self,
        paywall_id: Option<&str>,
        load_state: LoadState,
    ) {
        let Some(paywall_id) = paywall_id else {
            return;
        };
        let mut state = self.state.lock().await;
        let Some(paywall) = Self::active_paywall(&mut state, paywall_id) else {
            return;
        };
        paywall.response_loading.record(load_state);
        self.enqueue_active(&mut state).await;
    }

    pub async fn track_products_load(&self, paywall_id: &str, load_state: LoadState) {
        let mut state = self.state.lock().await;
        if Self::active_paywall(&mut state, paywall_id).is_none() {
            return;
        }
        if let Some(session) = state.active.as_mut() {
            session
                .products
                .loading
                .get_or_insert_with(Default::default)
                .record(load_state);
        }
        self.enqueue_active(&mut state).await;
    }

    // -- Transactions --------------------------------------------------------

    pub async fn track_begin_transaction(&self, product_id: &str) {
        let mut state = self.state.lock().await;
        let count = state.transaction_count.get_or_insert_with(Default::default);
        count.start += 1;
        let count = *count;

        if let Some(session) = state.active.as_mut() {
            session.transaction = Some(TransactionRecord {
                id: None,
                start_at: Some(chrono::Utc::now()),
                end_at: None,
                status: None,
                outcome: None,
                count: Some(count),
                product_id: Some(product_id.to_string()),
            });
        }
        self.enqueue_active(&mut state).await;
    }

    pub async fn track_transaction_error(&self) {
        self.finish_transaction(TransactionStatus::Fail, None, None)
            .await;
    }

    pub async fn track_transaction_abandon(&self) {
        self.finish_transaction(TransactionStatus::Abandon, None, None)
            .await;
    }

    /// A deferred transaction counts as a failure for session analytics;
    /// the eventual resolution arrives as a fresh transaction.
    pub async fn track_transaction_deferred(&self) {
        self.finish_transaction(TransactionStatus::Fail, None, None)
            .await;
    }

    /// A restore arrives without any preceding begin.
    pub async fn track_transaction_restoration(&self, id: Option<&str>, product_id: Option<&str>) {
        let mut state = self.state.lock().await;
        let count = state.transaction_count.get_or_insert_with(Default::default);
        count.restore += 1;
        let count = *count;

        if let Some(session) = state.active.as_mut() {
            let now = chrono::Utc::now();
            session.transaction = Some(TransactionRecord {
                id: id.map(ToString::to_string),
                start_at: Some(now),
                end_at: Some(now),
                status: Some(TransactionStatus::Complete),
                outcome: None,
                count: Some(count),
                product_id: product_id.map(ToString::to_string),
            });
        }
        self.enqueue_active(&mut state).await;
        if let Some(session) = state.active.as_mut() {
            session.transaction = None;
        }
    }

    pub async fn track_transaction_succeeded(
        &self,
        id: Option<&str>,
        is_non_recurring: bool,
        is_free_trial_available: bool,
    ) {
        let outcome = transaction_outcome(is_non_recurring, is_free_trial_available);
        self.finish_transaction(
            TransactionStatus::Complete,
            id.map(ToString::to_string),
            Some(outcome),
        )
        .await;
    }

    // -- App lifecycle -------------------------------------------------------

    /// Backgrounding stamps the end and flushes partial data for
    /// durability; the session is not torn down.
    pub async fn did_enter_background(&self) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.active.as_mut() {
            session.end();
        }
        self.enqueue_active(&mut state).await;
    }

    /// Foregrounding reissues the active session's id and clears the end
    /// stamp: the session logically continues across a brief background.
    pub async fn will_enter_foreground(&self) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.active.as_mut() {
            session.reissue_id();
        }
        self.enqueue_active(&mut state).await;
    }

    /// Stamps a new app session onto active and pending sessions.
    pub async fn update_app_session(&self, app_session: AppSession) {
        let mut state = self.state.lock().await;
        state.app_session = app_session.clone();
        if let Some(session) = state.active.as_mut() {
            session.app_session = app_session.clone();
        }
        for session in state.pending.values_mut() {
            session.app_session = app_session.clone();
        }

        let pending: Vec<TriggerSession> = state.pending.values().cloned().collect();
        self.queue.enqueue_all(pending).await;
        self.enqueue_active(&mut state).await;
    }

    /// Names with a pending session, for tests and diagnostics.
    pub async fn pending_trigger_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.pending.keys().cloned().collect()
    }

    // -- Internals -----------------------------------------------------------

    async fn end_locked(&self, state: &mut TrackerState) {
        let Some(mut session) = state.active.take() else {
            return;
        };
        session.end();
        session.is_subscribed = self.entitlements.is_subscribed().await;
        let trigger_name = session.trigger_name.clone();
        let products = session.products.all_product_ids.clone();
        self.queue.enqueue(session).await;

        // Recreate a fresh pending session so the next attempt has
        // somewhere to activate into.
        let replacement = TriggerSession::pending(
            &trigger_name,
            state.config_request_id.clone(),
            state.user_attributes.clone(),
            self.entitlements.is_subscribed().await,
            products,
            state.app_session.clone(),
        );
        state.pending.insert(trigger_name.clone(), replacement);
        state.transaction_count = None;
        tracing::info!(trigger_name, "Ended trigger session");
    }

    async fn enqueue_active(&self, state: &mut TrackerState) {
        let is_subscribed = self.entitlements.is_subscribed().await;
        if let Some(session) = state.active.as_mut() {
            session.is_subscribed = is_subscribed;
            let snapshot = session.clone();
            self.queue.enqueue(snapshot).await;
        }
    }

    fn active_paywall<'a>(
        state: &'a mut TrackerState,
        paywall_id: &str,
    ) -> Option<&'a mut PaywallSubsession> {
        state
            .active
            .as_mut()
            .and_then(|s| s.paywall.as_mut())
            .filter(|p| p.database_id == paywall_id)
    }

    async fn finish_transaction(
        &self,
        status: TransactionStatus,
        id: Option<String>,
        outcome: Option<TransactionOutcome>,
    ) {
        let mut state = self.state.lock().await;
        let count = state.transaction_count.get_or_insert_with(Default::default);
        match status {
            TransactionStatus::Fail => count.fail += 1,
            TransactionStatus::Abandon => count.abandon += 1,
            TransactionStatus::Complete => count.complete += 1,
        }
        let count = *count;

        if let Some(session) = state.active.as_mut() {
            if let Some(transaction) = session.transaction.as_mut() {
                transaction.count = Some(count);
                transaction.end_at = Some(chrono::Utc::now());
                transaction.status = Some(status);
                if id.is_some() {
                    transaction.id = id;
                }
                if outcome.is_some() {
                    transaction.outcome = outcome;
                }
            }
            if status == TransactionStatus::Complete {
                if let Some(paywall) = session.paywall.as_mut() {
                    paywall.converted_at = Some(chrono::Utc::now());
                }
            }
        }
        self.enqueue_active(&mut state).await;
        if let Some(session) = state.active.as_mut() {
            session.transaction = None;
        }
    }
}
