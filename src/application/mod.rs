//! Application layer: the once-per-host-lifetime context and its builder.

pub mod context;

pub use context::{Tollgate, TollgateBuilder};
