//! Terminal paywall states observed by callers.

use serde::{Deserialize, Serialize};

use super::experiment::{Experiment, Variant};
use super::paywall::PaywallInfo;
use crate::domain::error::PresentationError;

/// How a presented paywall was dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissedResult {
    Purchased { product_id: String },
    Declined,
    Restored,
}

/// Why a presentation was skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum SkippedReason {
    /// The user is in a holdout group for the matched experiment.
    Holdout {
        experiment: Experiment,
        variant: Variant,
    },
    /// No audience filter matched the event.
    NoAudienceMatch,
    /// The trigger name is not a placement in the current config.
    PlacementNotFound,
    /// The user is already subscribed.
    UserIsSubscribed,
    /// Something went wrong; never fatal to the host.
    Error(PresentationError),
}

/// The lifecycle states of one presentation request.
///
/// Every request yields exactly one terminal outcome: `Skipped`, `Dismissed`,
/// or `Presented` when the host never reports a dismissal.
#[derive(Debug, Clone, PartialEq)]
pub enum PaywallState {
    /// The paywall is on screen.
    Presented(PaywallInfo),
    /// The paywall left the screen.
    Dismissed(PaywallInfo, DismissedResult),
    /// Nothing was shown; the reason says why.
    Skipped(SkippedReason),
}

impl PaywallState {
    /// True for states after which the pipeline emits nothing further.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Presented(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminality() {
        let info = PaywallInfo {
            database_id: "db1".to_string(),
            identifier: "pw1".to_string(),
            name: "Launch Offer".to_string(),
            experiment_id: None,
            variant_id: None,
            presented_by_trigger: None,
        };
        assert!(!PaywallState::Presented(info.clone()).is_terminal());
        assert!(PaywallState::Dismissed(info, DismissedResult::Declined).is_terminal());
        assert!(PaywallState::Skipped(SkippedReason::NoAudienceMatch).is_terminal());
    }
}
