//! Shared stub collaborators for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use tollgate::domain::error::ContentError;
use tollgate::domain::models::{
    AudienceFilter, CachePolicy, Experiment, PaywallContent, PaywallInfo, PaywallOverrides,
    PresentationCondition, PreloadBehavior, PresenterHandle, ServerConfig, Trigger,
    TriggerSession, Variant, VariantOption, VariantType,
};
use tollgate::domain::ports::{
    ConfigProvider, ContentResolver, DeliveryTransport, DurableAssignmentStore,
    EntitlementProvider, PresentResult,
};

/// Config provider backed by a swappable snapshot.
pub struct StaticConfigProvider {
    config: Mutex<Option<ServerConfig>>,
}

impl StaticConfigProvider {
    pub fn new(config: Option<ServerConfig>) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    pub async fn set(&self, config: ServerConfig) {
        *self.config.lock().await = Some(config);
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn current_config(&self) -> Option<ServerConfig> {
        self.config.lock().await.clone()
    }
}

/// Entitlements whose readiness and subscription state tests control.
pub struct ControlledEntitlements {
    ready: AtomicBool,
    subscribed: AtomicBool,
    notify: Notify,
}

impl ControlledEntitlements {
    pub fn ready(subscribed: bool) -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            subscribed: AtomicBool::new(subscribed),
            notify: Notify::new(),
        })
    }

    pub fn never_ready() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    pub fn make_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn set_subscribed(&self, subscribed: bool) {
        self.subscribed.store(subscribed, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntitlementProvider for ControlledEntitlements {
    async fn status_known(&self) {
        while !self.ready.load(Ordering::SeqCst) {
            self.notify.notified().await;
        }
    }

    async fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }
}

/// Content resolver with configurable delays and failures.
pub struct StubResolver {
    pub resolve_delay: Duration,
    pub present_delay: Duration,
    pub fail_resolve: Option<ContentError>,
}

impl StubResolver {
    pub fn instant() -> Self {
        Self {
            resolve_delay: Duration::ZERO,
            present_delay: Duration::ZERO,
            fail_resolve: None,
        }
    }

    pub fn slow_resolve(delay: Duration) -> Self {
        Self {
            resolve_delay: delay,
            ..Self::instant()
        }
    }

    pub fn slow_present(delay: Duration) -> Self {
        Self {
            present_delay: delay,
            ..Self::instant()
        }
    }

    pub fn failing(error: ContentError) -> Self {
        Self {
            fail_resolve: Some(error),
            ..Self::instant()
        }
    }
}

#[async_trait]
impl ContentResolver for StubResolver {
    async fn resolve(
        &self,
        paywall_id: &str,
        _policy: CachePolicy,
        _overrides: &PaywallOverrides,
    ) -> Result<PaywallContent, ContentError> {
        if !self.resolve_delay.is_zero() {
            tokio::time::sleep(self.resolve_delay).await;
        }
        if let Some(error) = &self.fail_resolve {
            return Err(error.clone());
        }
        Ok(PaywallContent {
            info: PaywallInfo {
                database_id: format!("db-{paywall_id}"),
                identifier: paywall_id.to_string(),
                name: "Stub Paywall".to_string(),
                experiment_id: None,
                variant_id: None,
                presented_by_trigger: None,
            },
            presentation_condition: PresentationCondition::CheckUserSubscription,
            product_ids: vec!["product.annual".to_string()],
        })
    }

    async fn present(
        &self,
        _content: &PaywallContent,
        _presenter: &PresenterHandle,
    ) -> Result<PresentResult, ContentError> {
        if !self.present_delay.is_zero() {
            tokio::time::sleep(self.present_delay).await;
        }
        Ok(PresentResult::Presented)
    }
}

/// Transport that records every delivered session.
#[derive(Default)]
pub struct RecordingTransport {
    pub sessions: Mutex<Vec<TriggerSession>>,
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn send_session_batch(&self, sessions: Vec<TriggerSession>) {
        self.sessions.lock().await.extend(sessions);
    }
}

/// Assignment store held in memory.
#[derive(Default)]
pub struct MemoryAssignmentStore {
    pub saved: Mutex<HashMap<String, Variant>>,
}

#[async_trait]
impl DurableAssignmentStore for MemoryAssignmentStore {
    async fn load(&self) -> anyhow::Result<HashMap<String, Variant>> {
        Ok(self.saved.lock().await.clone())
    }

    async fn save(&self, assignments: &HashMap<String, Variant>) -> anyhow::Result<()> {
        *self.saved.lock().await = assignments.clone();
        Ok(())
    }
}

pub fn treatment_trigger(name: &str, experiment_id: &str, paywall_id: &str) -> Trigger {
    Trigger {
        placement_name: name.to_string(),
        audiences: vec![AudienceFilter {
            id: format!("{experiment_id}-audience"),
            expression: None,
            experiment: Experiment {
                id: experiment_id.to_string(),
                group_id: format!("{experiment_id}-group"),
                variants: vec![VariantOption {
                    id: "v-treatment".to_string(),
                    variant_type: VariantType::Treatment,
                    paywall_id: Some(paywall_id.to_string()),
                    weight: 100,
                }],
            },
            preload: PreloadBehavior::Always,
        }],
    }
}

pub fn holdout_trigger(name: &str, experiment_id: &str) -> Trigger {
    Trigger {
        placement_name: name.to_string(),
        audiences: vec![AudienceFilter {
            id: format!("{experiment_id}-audience"),
            expression: None,
            experiment: Experiment {
                id: experiment_id.to_string(),
                group_id: format!("{experiment_id}-group"),
                variants: vec![VariantOption {
                    id: "v-holdout".to_string(),
                    variant_type: VariantType::Holdout,
                    paywall_id: None,
                    weight: 100,
                }],
            },
            preload: PreloadBehavior::Always,
        }],
    }
}

pub fn config_with(triggers: Vec<Trigger>) -> ServerConfig {
    ServerConfig {
        request_id: Some("config-req-1".to_string()),
        triggers,
        paywalls: vec![],
        preloading_disabled: Default::default(),
    }
}
