//! Experiment assignment engine.
//!
//! Computes deterministic variant selection, merges on-device confirmed and
//! unconfirmed state, reconciles with server-reported assignments, and
//! derives the set of paywall ids worth preloading.
//!
//! The selection functions are pure: `(triggers, durable state)` in, `(new
//! durable state, new ephemeral state)` out, which keeps them deterministic
//! under test. All mutation of the live maps is serialized through a single
//! lock inside `AssignmentEngine`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::Mutex;

use crate::domain::error::AssignmentError;
use crate::domain::models::{
    AudienceFilter, EventData, ExperimentId, PreloadBehavior, PreloadingDisabled, ServerConfig,
    Trigger, TriggerResult, Variant, VariantOption,
};
use crate::domain::ports::{
    AssignmentFeedback, DurableAssignmentStore, RuleEvaluator, RuleMatch,
};

/// Uniform draw in `[0, bound)`. Injectable so selection is deterministic
/// in tests.
pub type DrawFn = dyn Fn(u32) -> u32 + Send + Sync;

/// An assignment as reported back by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAssignment {
    pub experiment_id: String,
    pub variant_id: String,
}

/// Result of recomputing assignments from a trigger set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentOutcome {
    pub confirmed: HashMap<ExperimentId, Variant>,
    pub unconfirmed: HashMap<ExperimentId, Variant>,
}

// ---------------------------------------------------------------------------
// Pure selection logic
// ---------------------------------------------------------------------------

/// Chooses a variant by cumulative weight.
///
/// A single variant wins outright even at weight 0 (explicit single-variant
/// override). A zero weight sum falls back to a uniform pick, covering
/// dashboard misconfiguration. Otherwise the draw lands in `[0, sum)` and
/// the first variant whose cumulative boundary strictly exceeds it wins.
pub fn choose_variant(
    variants: &[VariantOption],
    draw: &DrawFn,
) -> Result<Variant, AssignmentError> {
    if variants.is_empty() {
        return Err(AssignmentError::NoVariantsFound);
    }
    if variants.len() == 1 {
        return Ok(variants[0].to_variant());
    }

    let weight_sum: u32 = variants.iter().map(|v| v.weight).sum();
    if weight_sum == 0 {
        let index = draw(u32::try_from(variants.len()).unwrap_or(u32::MAX)) as usize;
        return Ok(variants[index.min(variants.len() - 1)].to_variant());
    }

    let threshold = draw(weight_sum);
    let mut cumulative = 0u32;
    for variant in variants {
        cumulative += variant.weight;
        if threshold < cumulative {
            return Ok(variant.to_variant());
        }
    }

    // Exhausting the loop means the draw was outside [0, sum).
    Err(AssignmentError::InvalidState)
}

/// Groups audience filters by campaign so each unique experiment is rolled
/// once even when referenced by multiple triggers.
pub fn audience_filters_per_campaign(triggers: &[Trigger]) -> Vec<Vec<AudienceFilter>> {
    let mut seen_groups: HashSet<String> = HashSet::new();
    let mut grouped = Vec::new();
    for trigger in triggers {
        let Some(first) = trigger.audiences.first() else {
            continue;
        };
        if seen_groups.insert(first.experiment.group_id.clone()) {
            grouped.push(trigger.audiences.clone());
        }
    }
    grouped
}

/// Recomputes assignments for a trigger set against the confirmed map.
///
/// Confirmed entries whose variant id is still live are kept untouched.
/// Stale confirmed entries are rerolled into the unconfirmed set; when the
/// reroll itself fails the stale entry is deleted rather than substituted.
/// Experiments with no assignment at all get a fresh unconfirmed roll.
pub fn choose_assignments(
    triggers: &[Trigger],
    confirmed: &HashMap<ExperimentId, Variant>,
    draw: &DrawFn,
) -> AssignmentOutcome {
    let mut confirmed = confirmed.clone();
    let mut unconfirmed: HashMap<ExperimentId, Variant> = HashMap::new();

    for audience_group in audience_filters_per_campaign(triggers) {
        for audience in &audience_group {
            let experiment = &audience.experiment;

            if let Some(existing) = confirmed.get(&experiment.id) {
                if experiment.has_variant(&existing.id) {
                    continue;
                }
                // Dashboard changed the variants out from under us.
                match choose_variant(&experiment.variants, draw) {
                    Ok(variant) => {
                        unconfirmed.insert(experiment.id.clone(), variant);
                        confirmed.remove(&experiment.id);
                    }
                    Err(error) => {
                        tracing::error!(
                            experiment_id = %experiment.id,
                            %error,
                            "Dropping stale confirmed assignment; reroll failed"
                        );
                        confirmed.remove(&experiment.id);
                    }
                }
            } else {
                match choose_variant(&experiment.variants, draw) {
                    Ok(variant) => {
                        unconfirmed.insert(experiment.id.clone(), variant);
                    }
                    Err(error) => {
                        tracing::error!(
                            experiment_id = %experiment.id,
                            %error,
                            "Skipping experiment; variant selection failed"
                        );
                    }
                }
            }
        }
    }

    AssignmentOutcome {
        confirmed,
        unconfirmed,
    }
}

/// Applies server-reported assignments on top of local state. Server state
/// always wins over local unconfirmed choices.
pub fn transfer_from_server(
    assignments: &[ServerAssignment],
    triggers: &[Trigger],
    confirmed: &HashMap<ExperimentId, Variant>,
    unconfirmed: &HashMap<ExperimentId, Variant>,
) -> AssignmentOutcome {
    let mut confirmed = confirmed.clone();
    let mut unconfirmed = unconfirmed.clone();

    for assignment in assignments {
        let variant = triggers
            .iter()
            .flat_map(|t| &t.audiences)
            .filter(|a| a.experiment.id == assignment.experiment_id)
            .find_map(|a| a.experiment.variant(&assignment.variant_id));
        let Some(variant) = variant else {
            continue;
        };

        confirmed.insert(assignment.experiment_id.clone(), variant.to_variant());
        unconfirmed.remove(&assignment.experiment_id);
    }

    AssignmentOutcome {
        confirmed,
        unconfirmed,
    }
}

/// Treatment paywall ids across the merged assignment maps, without preload
/// policy filtering. Unconfirmed entries win on conflict.
pub fn active_treatment_paywall_ids(
    triggers: &[Trigger],
    confirmed: &HashMap<ExperimentId, Variant>,
    unconfirmed: &HashMap<ExperimentId, Variant>,
) -> HashSet<String> {
    let mut merged = confirmed.clone();
    merged.extend(unconfirmed.clone());

    audience_filters_per_campaign(triggers)
        .iter()
        .flatten()
        .filter_map(|audience| merged.get(&audience.experiment.id))
        .filter(|variant| variant.variant_type == crate::domain::models::VariantType::Treatment)
        .filter_map(|variant| variant.paywall_id.clone())
        .collect()
}

/// Drops triggers whose preloading has been remotely disabled.
pub fn filter_triggers(triggers: &[Trigger], disabled: &PreloadingDisabled) -> Vec<Trigger> {
    if disabled.all {
        return Vec::new();
    }
    triggers
        .iter()
        .filter(|t| !disabled.triggers.contains(&t.placement_name))
        .cloned()
        .collect()
}

/// Paywall ids that vanished from the new config or whose cache key changed,
/// so hosts can evict stale cached content.
pub fn removed_or_changed_paywall_ids(
    old_config: &ServerConfig,
    new_config: &ServerConfig,
) -> HashSet<String> {
    let old_keys: HashMap<&str, &str> = old_config
        .paywalls
        .iter()
        .map(|p| (p.identifier.as_str(), p.cache_key.as_str()))
        .collect();
    let new_ids: HashSet<&str> = new_config
        .paywalls
        .iter()
        .map(|p| p.identifier.as_str())
        .collect();

    let mut result: HashSet<String> = old_keys
        .keys()
        .filter(|id| !new_ids.contains(*id))
        .map(|id| (*id).to_string())
        .collect();

    for paywall in &new_config.paywalls {
        if let Some(old_key) = old_keys.get(paywall.identifier.as_str()) {
            if *old_key != paywall.cache_key {
                result.insert(paywall.identifier.clone());
            }
        }
    }

    result
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AssignmentMaps {
    confirmed: HashMap<ExperimentId, Variant>,
    unconfirmed: HashMap<ExperimentId, Variant>,
}

/// Owns the live assignment maps. One lock serializes every
/// read-for-mutation and write, so a confirmation can never interleave with
/// a recomputation.
pub struct AssignmentEngine {
    maps: Mutex<AssignmentMaps>,
    store: Arc<dyn DurableAssignmentStore>,
    feedback: Arc<dyn AssignmentFeedback>,
    draw: Arc<DrawFn>,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn DurableAssignmentStore>,
        feedback: Arc<dyn AssignmentFeedback>,
    ) -> Self {
        Self {
            maps: Mutex::new(AssignmentMaps::default()),
            store,
            feedback,
            draw: Arc::new(|bound| rand::thread_rng().gen_range(0..bound)),
        }
    }

    /// Replaces the RNG draw. For deterministic tests.
    pub fn with_draw(mut self, draw: Arc<DrawFn>) -> Self {
        self.draw = draw;
        self
    }

    /// Loads confirmed assignments from durable storage. Unconfirmed state
    /// deliberately starts empty on every launch.
    pub async fn load_from_disk(&self) -> anyhow::Result<()> {
        let confirmed = self.store.load().await?;
        let mut maps = self.maps.lock().await;
        tracing::debug!(count = confirmed.len(), "Loaded confirmed assignments");
        maps.confirmed = confirmed;
        maps.unconfirmed.clear();
        Ok(())
    }

    /// Recomputes assignments after a config (re)load.
    pub async fn reroll_assignments(&self, triggers: &[Trigger]) {
        let mut maps = self.maps.lock().await;
        let outcome = choose_assignments(triggers, &maps.confirmed, self.draw.as_ref());
        let confirmed_changed = outcome.confirmed != maps.confirmed;
        maps.confirmed = outcome.confirmed;
        maps.unconfirmed = outcome.unconfirmed;
        if confirmed_changed {
            self.persist(&maps.confirmed).await;
        }
    }

    /// Moves an assignment from unconfirmed to confirmed atomically and
    /// schedules the fire-and-forget server notification.
    pub async fn confirm_assignment(&self, experiment_id: &str, variant: &Variant) {
        {
            let mut maps = self.maps.lock().await;
            maps.unconfirmed.remove(experiment_id);
            maps.confirmed
                .insert(experiment_id.to_string(), variant.clone());
            self.persist(&maps.confirmed).await;
        }

        tracing::debug!(experiment_id, "Confirmed assignment");
        let feedback = Arc::clone(&self.feedback);
        let experiment_id = experiment_id.to_string();
        let variant_id = variant.id.clone();
        tokio::spawn(async move {
            feedback
                .assignment_confirmed(&experiment_id, &variant_id)
                .await;
        });
    }

    /// Overwrites local state with server-reported assignments.
    pub async fn reconcile_from_server(
        &self,
        assignments: &[ServerAssignment],
        triggers: &[Trigger],
    ) {
        let mut maps = self.maps.lock().await;
        let outcome =
            transfer_from_server(assignments, triggers, &maps.confirmed, &maps.unconfirmed);
        maps.confirmed = outcome.confirmed;
        maps.unconfirmed = outcome.unconfirmed;
        self.persist(&maps.confirmed).await;
    }

    /// The variant the user is bucketed into for `experiment`, rolling a
    /// fresh unconfirmed one if neither map has an entry yet.
    pub async fn variant_for(
        &self,
        experiment: &crate::domain::models::Experiment,
    ) -> Result<Variant, AssignmentError> {
        let mut maps = self.maps.lock().await;
        if let Some(variant) = maps
            .unconfirmed
            .get(&experiment.id)
            .or_else(|| maps.confirmed.get(&experiment.id))
        {
            return Ok(variant.clone());
        }
        let variant = choose_variant(&experiment.variants, self.draw.as_ref())?;
        maps.unconfirmed
            .insert(experiment.id.clone(), variant.clone());
        Ok(variant)
    }

    /// Evaluates a trigger's audiences in order and produces the single
    /// decision for this presentation attempt.
    pub async fn trigger_outcome(
        &self,
        trigger: Option<&Trigger>,
        event: Option<&EventData>,
        evaluator: &dyn RuleEvaluator,
    ) -> TriggerResult {
        let Some(trigger) = trigger else {
            return TriggerResult::PlacementNotFound;
        };

        for audience in &trigger.audiences {
            if evaluator.evaluate(audience, event).await == RuleMatch::NoMatch {
                continue;
            }

            match self.variant_for(&audience.experiment).await {
                Ok(variant) => {
                    let experiment = audience.experiment.clone();
                    return match variant.variant_type {
                        crate::domain::models::VariantType::Holdout => TriggerResult::Holdout {
                            experiment,
                            variant,
                        },
                        crate::domain::models::VariantType::Treatment => TriggerResult::Paywall {
                            experiment,
                            variant,
                        },
                    };
                }
                Err(error) => {
                    tracing::error!(
                        experiment_id = %audience.experiment.id,
                        %error,
                        "Variant selection failed for matched audience"
                    );
                    return TriggerResult::Error(error.to_string());
                }
            }
        }

        TriggerResult::NoAudienceMatch
    }

    /// Paywall ids worth preloading, honoring each audience's preload
    /// policy. Also prunes confirmed assignments for experiments that no
    /// longer appear in any trigger (archived campaigns) before merging.
    pub async fn all_active_treatment_paywall_ids(
        &self,
        triggers: &[Trigger],
        evaluator: &dyn RuleEvaluator,
    ) -> HashSet<String> {
        let grouped = audience_filters_per_campaign(triggers);

        let mut all_experiment_ids: HashSet<ExperimentId> = HashSet::new();
        let mut skipped_experiment_ids: HashSet<ExperimentId> = HashSet::new();

        for group in &grouped {
            for audience in group {
                all_experiment_ids.insert(audience.experiment.id.clone());
                match audience.preload {
                    PreloadBehavior::Always => {}
                    PreloadBehavior::Never => {
                        skipped_experiment_ids.insert(audience.experiment.id.clone());
                    }
                    PreloadBehavior::IfTrue => {
                        if evaluator.evaluate(audience, None).await == RuleMatch::NoMatch {
                            skipped_experiment_ids.insert(audience.experiment.id.clone());
                        }
                    }
                }
            }
        }

        let mut maps = self.maps.lock().await;

        // Archived campaigns leave confirmed entries behind; prune them
        // from durable state before merging.
        let stale: Vec<ExperimentId> = maps
            .confirmed
            .keys()
            .filter(|id| !all_experiment_ids.contains(*id))
            .cloned()
            .collect();
        if !stale.is_empty() {
            for id in &stale {
                maps.confirmed.remove(id);
            }
            tracing::debug!(count = stale.len(), "Pruned archived confirmed assignments");
            self.persist(&maps.confirmed).await;
        }

        let mut merged = maps.confirmed.clone();
        merged.extend(maps.unconfirmed.clone());

        merged
            .iter()
            .filter(|(id, _)| !skipped_experiment_ids.contains(*id))
            .filter(|(_, variant)| {
                variant.variant_type == crate::domain::models::VariantType::Treatment
            })
            .filter_map(|(_, variant)| variant.paywall_id.clone())
            .collect()
    }

    /// Clones of both maps, for diagnostics and tests.
    pub async fn snapshot(&self) -> AssignmentOutcome {
        let maps = self.maps.lock().await;
        AssignmentOutcome {
            confirmed: maps.confirmed.clone(),
            unconfirmed: maps.unconfirmed.clone(),
        }
    }

    async fn persist(&self, confirmed: &HashMap<ExperimentId, Variant>) {
        // Persistence failures are the store's to retry; the in-memory maps
        // stay authoritative either way.
        if let Err(error) = self.store.save(confirmed).await {
            tracing::warn!(%error, "Failed to persist confirmed assignments");
        }
    }
}
