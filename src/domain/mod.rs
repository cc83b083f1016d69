//! Domain layer: pure models, collaborator ports, and the error taxonomy.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{AssignmentError, ContentError, PresentationError};
