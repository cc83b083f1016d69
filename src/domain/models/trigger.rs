//! Trigger and audience models, plus the trigger evaluation outcome.
//!
//! A trigger is a named placement that may cause a paywall to be evaluated
//! for display. Each trigger carries an ordered list of audience filters;
//! the first filter whose rule matches the incoming event decides which
//! experiment the user is rolled into.

use serde::{Deserialize, Serialize};

use super::experiment::{Experiment, Variant};

/// Preloading behavior for an audience filter's paywall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreloadBehavior {
    /// Always preload the treatment paywall.
    Always,
    /// Never preload it.
    Never,
    /// Preload only while the filter's rule currently matches.
    IfTrue,
}

/// A single audience rule within a trigger.
///
/// The expression language itself is opaque to this crate; evaluation is
/// delegated to the host through the `RuleEvaluator` port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceFilter {
    pub id: String,
    /// Rule expression, `None` matches everyone.
    pub expression: Option<String>,
    pub experiment: Experiment,
    #[serde(default = "default_preload")]
    pub preload: PreloadBehavior,
}

fn default_preload() -> PreloadBehavior {
    PreloadBehavior::Always
}

/// A named placement that can show a paywall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub placement_name: String,
    pub audiences: Vec<AudienceFilter>,
}

/// The single decision point for "show something vs. show nothing".
///
/// Exactly one of these is produced per evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerResult {
    /// A treatment variant was chosen; its paywall should be presented.
    Paywall {
        experiment: Experiment,
        variant: Variant,
    },
    /// A holdout variant was chosen; nothing is shown.
    Holdout {
        experiment: Experiment,
        variant: Variant,
    },
    /// No audience filter matched the event.
    NoAudienceMatch,
    /// The placement is not present in the current config.
    PlacementNotFound,
    /// Evaluation failed internally; the cause is reported but never fatal.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::experiment::{VariantOption, VariantType};

    #[test]
    fn test_audience_filter_default_preload() {
        let json = serde_json::json!({
            "id": "a1",
            "expression": null,
            "experiment": {
                "id": "exp1",
                "group_id": "g1",
                "variants": [
                    { "id": "v1", "type": "holdout", "paywall_id": null, "weight": 100 }
                ]
            }
        });
        let filter: AudienceFilter = serde_json::from_value(json).unwrap();
        assert_eq!(filter.preload, PreloadBehavior::Always);
        assert_eq!(
            filter.experiment.variants[0].variant_type,
            VariantType::Holdout
        );
    }

    #[test]
    fn test_trigger_result_equality() {
        let experiment = Experiment {
            id: "exp1".to_string(),
            group_id: "g1".to_string(),
            variants: vec![VariantOption {
                id: "v1".to_string(),
                variant_type: VariantType::Treatment,
                paywall_id: Some("pw1".to_string()),
                weight: 100,
            }],
        };
        let variant = experiment.variants[0].to_variant();
        let a = TriggerResult::Paywall {
            experiment: experiment.clone(),
            variant: variant.clone(),
        };
        let b = TriggerResult::Paywall { experiment, variant };
        assert_eq!(a, b);
        assert_ne!(a, TriggerResult::NoAudienceMatch);
    }
}
