//! Experiment and variant models.
//!
//! An experiment is a named A/B-test unit received from the server config.
//! Each variant is either a treatment (shows a specific paywall) or a
//! holdout (deliberately shows nothing so baseline behavior can be measured).

use serde::{Deserialize, Serialize};

/// Identifier of an experiment, unique within a config.
pub type ExperimentId = String;

/// Whether a variant shows a paywall or withholds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantType {
    /// Shows the paywall referenced by `paywall_id`.
    Treatment,
    /// Shows nothing. Holdout variants never carry a paywall id.
    Holdout,
}

/// A weighted variant as configured on the dashboard.
///
/// The weight is a relative share, not a percentage; weights across an
/// experiment's variants need not sum to 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOption {
    pub id: String,
    #[serde(rename = "type")]
    pub variant_type: VariantType,
    pub paywall_id: Option<String>,
    pub weight: u32,
}

impl VariantOption {
    /// Strips the weight, leaving the form stored in assignments.
    pub fn to_variant(&self) -> Variant {
        Variant {
            id: self.id.clone(),
            variant_type: self.variant_type,
            paywall_id: self.paywall_id.clone(),
        }
    }
}

/// A chosen variant, as persisted in an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    #[serde(rename = "type")]
    pub variant_type: VariantType,
    pub paywall_id: Option<String>,
}

/// An A/B-test unit. Immutable once received from config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    /// Campaign the experiment belongs to. Experiments sharing a group are
    /// rolled once even when referenced by multiple triggers.
    pub group_id: String,
    pub variants: Vec<VariantOption>,
}

impl Experiment {
    /// Looks up a variant option by id.
    pub fn variant(&self, variant_id: &str) -> Option<&VariantOption> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// True if `variant_id` is among the experiment's current variants.
    pub fn has_variant(&self, variant_id: &str) -> bool {
        self.variant(variant_id).is_some()
    }
}
