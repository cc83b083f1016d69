//! Pure domain models: experiments, triggers, requests, sessions, and the
//! terminal states callers observe.

pub mod config;
pub mod experiment;
pub mod paywall;
pub mod request;
pub mod session;
pub mod state;
pub mod trigger;

pub use config::{PaywallStub, PreloadingDisabled, ServerConfig};
pub use experiment::{Experiment, ExperimentId, Variant, VariantOption, VariantType};
pub use paywall::{PaywallContent, PaywallInfo, PresentationCondition};
pub use request::{
    CachePolicy, EventData, EventValue, PaywallOverrides, PresentationFlags, PresentationRequest,
    PresenterHandle,
};
pub use session::{
    AppSession, LoadState, LoadTimings, PaywallSubsession, PresentationOutcome, SessionProducts,
    TransactionCount, TransactionOutcome, TransactionRecord, TransactionStatus, TriggerSession,
    MANUAL_PRESENT_TRIGGER,
};
pub use state::{DismissedResult, PaywallState, SkippedReason};
pub use trigger::{AudienceFilter, PreloadBehavior, Trigger, TriggerResult};
