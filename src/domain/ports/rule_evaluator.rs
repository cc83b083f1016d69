/// Rule evaluator port (trait) for dependency injection.
///
/// The boolean-expression language used by audience filters is opaque to
/// this crate; the host supplies the evaluator.
use async_trait::async_trait;

use crate::domain::models::{AudienceFilter, EventData};

/// Outcome of evaluating one audience filter against an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    Match,
    NoMatch,
}

/// Evaluates audience rules. Async-capable: implementations may consult a
/// sandboxed interpreter or cached device state.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    async fn evaluate(&self, filter: &AudienceFilter, event: Option<&EventData>) -> RuleMatch;
}

/// Evaluator that matches every rule. Useful for tests and for hosts that
/// do not use audience expressions.
#[derive(Debug, Clone, Default)]
pub struct MatchAllEvaluator;

#[async_trait]
impl RuleEvaluator for MatchAllEvaluator {
    async fn evaluate(&self, _filter: &AudienceFilter, _event: Option<&EventData>) -> RuleMatch {
        RuleMatch::Match
    }
}
