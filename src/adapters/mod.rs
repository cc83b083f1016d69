//! Concrete port implementations that need no host support.

pub mod json_store;

pub use json_store::{JsonFileAssignmentStore, JsonFileSessionCache};
