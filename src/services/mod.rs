//! Core services: assignment engine, presentation pipeline, session
//! tracking, and batched analytics delivery.

pub mod assignment_engine;
pub mod delivery_queue;
pub mod pipeline;
pub mod session_tracker;

pub use assignment_engine::{AssignmentEngine, AssignmentOutcome, ServerAssignment};
pub use delivery_queue::DeliveryQueue;
pub use pipeline::{PaywallStream, PipelineDeps, PipelineTimeouts};
pub use session_tracker::SessionTracker;
