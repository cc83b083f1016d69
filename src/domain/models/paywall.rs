//! Resolved paywall content models.

use serde::{Deserialize, Serialize};

/// Whether a paywall may be shown to an already-entitled user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationCondition {
    /// Present regardless of subscription status.
    Always,
    /// Skip when the user is already subscribed.
    CheckUserSubscription,
}

/// Identifying information about a paywall, surfaced in terminal states and
/// analytics sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaywallInfo {
    /// Server-side database id, used to guard sub-phase tracking.
    pub database_id: String,
    /// Human-assigned identifier from the dashboard.
    pub identifier: String,
    pub name: String,
    /// Experiment/variant that selected this paywall, when one did.
    pub experiment_id: Option<String>,
    pub variant_id: Option<String>,
    /// Placement that caused the presentation.
    pub presented_by_trigger: Option<String>,
}

/// Materialized paywall content, resolved through the `ContentResolver` port.
///
/// The actual view/web content stays with the resolver; the pipeline only
/// carries the metadata it needs for presentability checks and analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaywallContent {
    pub info: PaywallInfo,
    pub presentation_condition: PresentationCondition,
    /// Product identifiers shown on the paywall, in display order.
    pub product_ids: Vec<String>,
}
