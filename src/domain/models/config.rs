//! Server configuration snapshot consumed by the engine.
//!
//! This is the abstract shape of whatever the host's config layer fetched;
//! the wire format is the host's concern.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::trigger::Trigger;

/// Summary of a paywall as listed in the config, enough to detect staleness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaywallStub {
    pub identifier: String,
    /// Changes whenever the paywall's content changes on the dashboard.
    pub cache_key: String,
}

/// Remote switch for disabling preloading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadingDisabled {
    /// Disable preloading entirely.
    pub all: bool,
    /// Disable preloading for these placement names only.
    pub triggers: Vec<String>,
}

/// A config snapshot as reported by the `ConfigProvider` port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Correlates analytics sessions with the config fetch that produced them.
    pub request_id: Option<String>,
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub paywalls: Vec<PaywallStub>,
    #[serde(default)]
    pub preloading_disabled: PreloadingDisabled,
}

impl ServerConfig {
    /// Indexes triggers by placement name.
    pub fn triggers_by_placement_name(&self) -> HashMap<String, Trigger> {
        self.triggers
            .iter()
            .map(|t| (t.placement_name.clone(), t.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triggers_by_placement_name() {
        let config = ServerConfig {
            request_id: Some("req1".to_string()),
            triggers: vec![
                Trigger {
                    placement_name: "onboarding".to_string(),
                    audiences: vec![],
                },
                Trigger {
                    placement_name: "settings".to_string(),
                    audiences: vec![],
                },
            ],
            paywalls: vec![],
            preloading_disabled: PreloadingDisabled::default(),
        };

        let map = config.triggers_by_placement_name();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("onboarding"));
        assert!(map.contains_key("settings"));
    }
}
