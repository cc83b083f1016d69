//! Typed pipeline state.
//!
//! Each stage is a function over an accumulator struct and returns a
//! `StageOutcome`; the runner in `mod.rs` drives the stages in fixed order.
//! State only ever gains fields as it moves forward, it is never mutated
//! in place by a later stage.

use std::time::Duration;

use crate::domain::models::{
    Experiment, PaywallContent, PaywallState, PresentationRequest, PresenterHandle, ServerConfig,
    Variant,
};

/// What a stage tells the runner to do next.
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// Continue with the enriched state.
    Next(T),
    /// Stop and emit this terminal state.
    Finish(PaywallState),
    /// Stop without emitting anything. Used only for debugger isolation,
    /// where a skipped request must stay invisible to the caller.
    CancelSilently,
}

/// Bounds on the only stage allowed to block for its own account.
#[derive(Debug, Clone, Copy)]
pub struct PipelineTimeouts {
    /// How long to wait for subscription status to become known.
    pub entitlement_wait: Duration,
    /// Grace window before re-checking for a config one last time.
    pub config_grace: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self {
            entitlement_wait: Duration::from_secs(5),
            config_grace: Duration::from_secs(1),
        }
    }
}

/// State after prerequisites resolved: a config snapshot exists.
#[derive(Debug, Clone)]
pub struct Evaluable {
    pub request: PresentationRequest,
    pub config: ServerConfig,
}

/// State after the audience matched a treatment variant.
#[derive(Debug, Clone)]
pub struct Matched {
    pub request: PresentationRequest,
    pub experiment: Experiment,
    pub variant: Variant,
}

/// State after paywall content resolved.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub matched: Matched,
    pub content: PaywallContent,
}

/// State after the presentability check: entitled users filtered out and a
/// presenter secured.
#[derive(Debug, Clone)]
pub struct Presentable {
    pub resolved: Resolved,
    pub presenter: PresenterHandle,
}
