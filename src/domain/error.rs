//! Error taxonomy.
//!
//! Collaborator failures are caught at the pipeline boundary and translated
//! into typed `Skipped` reasons; none of these propagate as panics past the
//! public entry points.

use thiserror::Error;

/// Variant-selection and assignment errors. Local and recoverable: a failing
/// experiment is skipped, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("no variants found for experiment")]
    NoVariantsFound,

    /// The cumulative-weight walk exhausted the variant list without
    /// selecting. Programmer error; logged and the experiment is skipped.
    #[error("variant selection reached an invalid state")]
    InvalidState,
}

/// Content resolution errors reported by the `ContentResolver` port.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("paywall not found: {0}")]
    NotFound(String),

    #[error("network failure loading paywall: {0}")]
    Network(String),

    #[error("paywall content invalid: {0}")]
    Invalid(String),
}

/// Causes carried by `SkippedReason::Error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresentationError {
    /// Prerequisite wait (entitlement status / config) exceeded its bound.
    /// Reported to analytics as a distinct timeout event.
    #[error("timed out waiting for subscription status or config")]
    Timeout,

    /// No config has been fetched yet.
    #[error("no config available")]
    NoConfig,

    /// Neither an explicit presenter nor the overlay window is available.
    #[error("no presenter to show the paywall on")]
    NoPresenter,

    /// Another paywall is already on screen. An expected race, logged at
    /// info level.
    #[error("a paywall is already being presented")]
    AlreadyPresented,

    /// The caller cancelled the request mid-flight.
    #[error("presentation request was cancelled")]
    Cancelled,

    #[error(transparent)]
    Content(#[from] ContentError),

    /// Audience evaluation failed internally.
    #[error("trigger evaluation failed: {0}")]
    Evaluation(String),
}
