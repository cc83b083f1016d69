/// Durable assignment storage port (trait) for dependency injection.
///
/// Only confirmed assignments are ever written here; unconfirmed choices
/// live in memory and never survive a restart.
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::models::{ExperimentId, Variant};

#[async_trait]
pub trait DurableAssignmentStore: Send + Sync {
    /// Loads the full confirmed map. An empty map on first run.
    async fn load(&self) -> Result<HashMap<ExperimentId, Variant>>;

    /// Replaces the persisted confirmed map atomically.
    async fn save(&self, assignments: &HashMap<ExperimentId, Variant>) -> Result<()>;
}

/// Feedback channel for confirmed assignments.
///
/// Fire-and-forget: delivery failures are retried by the implementation,
/// never by the engine.
#[async_trait]
pub trait AssignmentFeedback: Send + Sync {
    async fn assignment_confirmed(&self, experiment_id: &str, variant_id: &str);
}

/// A no-op feedback sink for hosts that do not report assignments.
#[derive(Debug, Clone, Default)]
pub struct NullAssignmentFeedback;

#[async_trait]
impl AssignmentFeedback for NullAssignmentFeedback {
    async fn assignment_confirmed(&self, _experiment_id: &str, _variant_id: &str) {}
}
