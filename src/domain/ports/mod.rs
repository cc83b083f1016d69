//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that host adapters must
//! implement:
//! - `ConfigProvider`: access to the fetched dashboard config
//! - `RuleEvaluator`: audience expression evaluation
//! - `ContentResolver`: paywall content fetch + present
//! - `EntitlementProvider`: subscription status
//! - `DurableAssignmentStore` / `AssignmentFeedback`: confirmed-assignment
//!   persistence and server reporting
//! - `DeliveryTransport` / `SessionCache`: analytics delivery
//! - `PresenterProvider`: fallback overlay presenter
//!
//! These traits are the seams that keep the core independent of UI,
//! networking, and storage mechanics.

pub mod assignment_store;
pub mod config_provider;
pub mod content_resolver;
pub mod delivery;
pub mod entitlement_provider;
pub mod presenter_provider;
pub mod rule_evaluator;

pub use assignment_store::{AssignmentFeedback, DurableAssignmentStore, NullAssignmentFeedback};
pub use config_provider::ConfigProvider;
pub use content_resolver::{ContentResolver, PresentResult};
pub use delivery::{DeliveryTransport, NullDeliveryTransport, NullSessionCache, SessionCache};
pub use entitlement_provider::EntitlementProvider;
pub use presenter_provider::{OverlayPresenterProvider, PresenterProvider};
pub use rule_evaluator::{MatchAllEvaluator, RuleEvaluator, RuleMatch};
