//! Tollgate - Remote Paywall Presentation Engine
//!
//! Tollgate lets a host application remotely control when and which paywall
//! UI is shown, based on server-defined campaigns, A/B experiments, and
//! per-user bucketing, while keeping presentation attempts serialized,
//! idempotent, and fully accounted for in analytics.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure models, error taxonomy, and the port
//!   traits host applications implement
//! - **Application Layer** (`application`): The `Tollgate` context built once
//!   per host lifetime
//! - **Service Layer** (`services`): Assignment engine, presentation
//!   pipeline, session tracker, and delivery queue
//! - **Adapters** (`adapters`): Built-in JSON-file persistence
//! - **Infrastructure Layer** (`infrastructure`): Options loading and logger
//!   setup
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tollgate::application::Tollgate;
//! use tollgate::domain::models::PresentationRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tollgate = Tollgate::builder(config, resolver, entitlements).build();
//!     tollgate.start().await?;
//!
//!     let mut stream = tollgate.present(PresentationRequest::new("campaign_trigger"));
//!     while let Some(state) = stream.next_state().await {
//!         println!("paywall state: {state:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{Tollgate, TollgateBuilder};
pub use domain::error::{AssignmentError, ContentError, PresentationError};
pub use domain::models::{
    CachePolicy, DismissedResult, EventData, EventValue, Experiment, PaywallInfo, PaywallState,
    PresentationRequest, PresenterHandle, ServerConfig, SkippedReason, Trigger, TriggerResult,
    Variant, VariantType,
};
pub use domain::ports::{
    ConfigProvider, ContentResolver, DeliveryTransport, DurableAssignmentStore,
    EntitlementProvider, PresenterProvider, RuleEvaluator,
};
pub use infrastructure::config::{OptionsError, OptionsLoader, TollgateOptions};
pub use services::{AssignmentEngine, DeliveryQueue, PaywallStream, SessionTracker};
