//! Trigger-session analytics models.
//!
//! A trigger session spans one evaluation-to-resolution lifecycle for a
//! placement. Sessions are created pending when config loads, activated by a
//! presentation request, mutated by sub-phase trackers while active, and
//! ended exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::request::EventValue;

/// Synthetic placement name used for programmatic (non-campaign) presents.
pub const MANUAL_PRESENT_TRIGGER: &str = "manual_present";

/// The resolved outcome recorded on an activated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationOutcome {
    Paywall,
    Holdout,
    NoAudienceMatch,
}

/// Start/end/fail timestamps of one load phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTimings {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub fail_at: Option<DateTime<Utc>>,
}

/// Which edge of a load phase is being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Start,
    End,
    Fail,
}

impl LoadTimings {
    /// Stamps the timing that corresponds to `state` with the current time.
    pub fn record(&mut self, state: LoadState) {
        let now = Utc::now();
        match state {
            LoadState::Start => self.start_at = Some(now),
            LoadState::End => self.end_at = Some(now),
            LoadState::Fail => self.fail_at = Some(now),
        }
    }
}

/// Paywall sub-phase of an active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaywallSubsession {
    /// Database id of the paywall being tracked. Sub-phase updates for any
    /// other paywall id are dropped so concurrently preloading paywalls
    /// cannot cross-contaminate the record.
    pub database_id: String,
    pub open_at: Option<DateTime<Utc>>,
    pub close_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub webview_loading: LoadTimings,
    #[serde(default)]
    pub response_loading: LoadTimings,
}

impl PaywallSubsession {
    pub fn new(database_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            open_at: None,
            close_at: None,
            converted_at: None,
            webview_loading: LoadTimings::default(),
            response_loading: LoadTimings::default(),
        }
    }
}

/// Cumulative per-session transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCount {
    pub start: u32,
    pub fail: u32,
    pub abandon: u32,
    pub restore: u32,
    pub complete: u32,
}

/// Terminal status of one transaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Fail,
    Abandon,
    Complete,
}

/// What a completed transaction amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOutcome {
    NonRecurringProductPurchase,
    FreeTrialStart,
    SubscriptionStart,
}

/// One transaction attempt within an active session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: Option<TransactionStatus>,
    pub outcome: Option<TransactionOutcome>,
    pub count: Option<TransactionCount>,
    pub product_id: Option<String>,
}

/// Products known to the session, with their load timings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProducts {
    pub all_product_ids: Vec<String>,
    pub loading: Option<LoadTimings>,
}

/// Reference to the surrounding app session, reissued when the app enters
/// the foreground after a long background stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSession {
    pub id: String,
    pub start_at: DateTime<Utc>,
}

impl AppSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_at: Utc::now(),
        }
    }
}

impl Default for AppSession {
    fn default() -> Self {
        Self::new()
    }
}

/// One evaluation-to-resolution analytics record for a placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSession {
    pub id: String,
    pub config_request_id: Option<String>,
    pub trigger_name: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_attributes: BTreeMap<String, EventValue>,
    pub is_subscribed: bool,
    pub presentation_outcome: Option<PresentationOutcome>,
    pub paywall: Option<PaywallSubsession>,
    #[serde(default)]
    pub products: SessionProducts,
    pub transaction: Option<TransactionRecord>,
    pub app_session: AppSession,
}

impl TriggerSession {
    /// Creates a pending session with a deterministic initial snapshot.
    pub fn pending(
        trigger_name: impl Into<String>,
        config_request_id: Option<String>,
        user_attributes: BTreeMap<String, EventValue>,
        is_subscribed: bool,
        products: Vec<String>,
        app_session: AppSession,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            config_request_id,
            trigger_name: trigger_name.into(),
            start_at: Utc::now(),
            end_at: None,
            user_attributes,
            is_subscribed,
            presentation_outcome: None,
            paywall: None,
            products: SessionProducts {
                all_product_ids: products,
                loading: None,
            },
            transaction: None,
            app_session,
        }
    }

    /// Stamps the end of the session.
    pub fn end(&mut self) {
        self.end_at = Some(Utc::now());
    }

    /// Reissues the session id and clears `end_at`. Used when the app
    /// returns to the foreground and the session logically continues.
    pub fn reissue_id(&mut self) {
        self.id = Uuid::new_v4().to_string();
        self.end_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_session(name: &str) -> TriggerSession {
        TriggerSession::pending(
            name,
            Some("req1".to_string()),
            BTreeMap::new(),
            false,
            vec![],
            AppSession::new(),
        )
    }

    #[test]
    fn test_pending_session_snapshot() {
        let session = pending_session("onboarding");
        assert_eq!(session.trigger_name, "onboarding");
        assert!(session.end_at.is_none());
        assert!(session.presentation_outcome.is_none());
        assert!(session.paywall.is_none());
        assert!(session.transaction.is_none());
    }

    #[test]
    fn test_end_stamps_once() {
        let mut session = pending_session("onboarding");
        session.end();
        assert!(session.end_at.is_some());
    }

    #[test]
    fn test_reissue_changes_id_and_clears_end() {
        let mut session = pending_session("onboarding");
        let original = session.id.clone();
        session.end();
        session.reissue_id();
        assert_ne!(session.id, original);
        assert!(session.end_at.is_none());
    }

    #[test]
    fn test_load_timings_record() {
        let mut timings = LoadTimings::default();
        timings.record(LoadState::Start);
        timings.record(LoadState::End);
        assert!(timings.start_at.is_some());
        assert!(timings.end_at.is_some());
        assert!(timings.fail_at.is_none());
    }
}
