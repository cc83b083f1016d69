//! Infrastructure: options loading and logger setup.

pub mod config;
pub mod logging;

pub use config::{OptionsError, OptionsLoader, TollgateOptions};
pub use logging::Logger;
