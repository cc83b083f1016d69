/// Config provider port (trait) for dependency injection.
///
/// The host's config layer fetches and refreshes the dashboard config; the
/// core only consumes snapshots through this contract.
use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::models::{ServerConfig, Trigger};

/// Read access to the most recently fetched config.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// The current config snapshot, `None` until the first fetch lands.
    async fn current_config(&self) -> Option<ServerConfig>;

    /// Triggers indexed by placement name, empty before the first fetch.
    async fn triggers_by_name(&self) -> HashMap<String, Trigger> {
        match self.current_config().await {
            Some(config) => config.triggers_by_placement_name(),
            None => HashMap::new(),
        }
    }
}
