//! The presentation pipeline.
//!
//! An ordered, cancellable sequence of stages that decides whether a paywall
//! should appear, materializes it, and presents it exactly once:
//!
//! 1. await prerequisites (bounded wait for entitlement status + config)
//! 2. log and snapshot the request
//! 3. debugger exclusivity gate
//! 4. evaluate the audience
//! 5. branch on the trigger result
//! 6. confirm the holdout assignment (treatment confirmation is deferred)
//! 7. resolve paywall content
//! 8. presentability check + presenter resolution
//! 9. activate the trigger session
//! 10. presented-flag gate + present call
//! 11. store the presentation for replay + confirm the treatment assignment
//!
//! Each request yields at most one terminal state on its stream; a request
//! silenced by the debugger gate yields none, every other path yields exactly
//! one. `Presented` is non-terminal: the stream stays open until the host
//! reports a dismissal.

mod stages;
mod state;

pub use state::{PipelineTimeouts, StageOutcome};

use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use crate::domain::models::{
    PaywallInfo, PaywallState, PresentationOutcome, PresentationRequest,
};
use crate::domain::ports::{
    ConfigProvider, ContentResolver, EntitlementProvider, PresenterProvider, RuleEvaluator,
};
use crate::services::assignment_engine::AssignmentEngine;
use crate::services::session_tracker::SessionTracker;

/// A presentation that made it to the screen. Held by the context so the
/// host can report the dismissal and replay the request.
pub struct ActivePresentation {
    pub request: PresentationRequest,
    pub info: PaywallInfo,
    pub sender: mpsc::Sender<PaywallState>,
}

/// Everything a pipeline run needs, injected explicitly.
#[derive(Clone)]
pub struct PipelineDeps {
    pub config: Arc<dyn ConfigProvider>,
    pub evaluator: Arc<dyn RuleEvaluator>,
    pub resolver: Arc<dyn ContentResolver>,
    pub entitlements: Arc<dyn EntitlementProvider>,
    pub presenters: Arc<dyn PresenterProvider>,
    pub engine: Arc<AssignmentEngine>,
    pub tracker: Arc<SessionTracker>,
    /// The single on-screen-paywall gate, checked-and-set atomically at
    /// stage 10. Shared with the owning context, which clears it on dismiss.
    pub presented: Arc<Mutex<bool>>,
    pub debug_session_active: Arc<AtomicBool>,
    /// Stage 11 deposits the surviving presentation here.
    pub active_presentation: Arc<Mutex<Option<ActivePresentation>>>,
    pub timeouts: PipelineTimeouts,
}

/// Stream of paywall states for one request. Dropping the stream cancels
/// any in-flight pipeline work.
pub struct PaywallStream {
    inner: ReceiverStream<PaywallState>,
    cancel: watch::Sender<bool>,
}

impl PaywallStream {
    /// Stops forward progress. A session already opened by the request is
    /// still closed; the terminal state reports the cancellation.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// The next state, `None` once the stream closes.
    pub async fn next_state(&mut self) -> Option<PaywallState> {
        use futures::StreamExt;
        self.inner.next().await
    }
}

impl Stream for PaywallStream {
    type Item = PaywallState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for PaywallStream {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawns a pipeline run for the request and returns its state stream.
pub fn spawn(request: PresentationRequest, deps: PipelineDeps) -> PaywallStream {
    let (sender, receiver) = mpsc::channel(4);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(run(request, deps, cancel_rx, sender));
    PaywallStream {
        inner: ReceiverStream::new(receiver),
        cancel: cancel_tx,
    }
}

/// Drives the stages in order and emits states on the channel.
async fn run(
    request: PresentationRequest,
    deps: PipelineDeps,
    mut cancel: watch::Receiver<bool>,
    sender: mpsc::Sender<PaywallState>,
) {
    // Stage 1.
    let evaluable = match stages::await_prerequisites(&request, &deps, &mut cancel).await {
        StageOutcome::Next(state) => state,
        StageOutcome::Finish(terminal) => {
            let _ = sender.send(terminal).await;
            return;
        }
        StageOutcome::CancelSilently => return,
    };

    // Stage 2.
    stages::log_request(&evaluable);

    // Stage 3.
    let evaluable = match stages::debugger_gate(evaluable, &deps) {
        StageOutcome::Next(state) => state,
        StageOutcome::Finish(terminal) => {
            let _ = sender.send(terminal).await;
            return;
        }
        StageOutcome::CancelSilently => return,
    };

    // Stage 4.
    let result = stages::evaluate_audience(&evaluable, &deps).await;

    // Stages 5 and 6.
    let matched = match stages::handle_trigger_result(evaluable, result, &deps).await {
        StageOutcome::Next(state) => state,
        StageOutcome::Finish(terminal) => {
            let _ = sender.send(terminal).await;
            return;
        }
        StageOutcome::CancelSilently => return,
    };

    // Stage 7.
    let resolved = match stages::resolve_content(matched, &deps, &mut cancel).await {
        StageOutcome::Next(state) => state,
        StageOutcome::Finish(terminal) => {
            let _ = sender.send(terminal).await;
            return;
        }
        StageOutcome::CancelSilently => return,
    };

    // Stage 8.
    let presentable = match stages::check_presentability(resolved, &deps).await {
        StageOutcome::Next(state) => state,
        StageOutcome::Finish(terminal) => {
            let _ = sender.send(terminal).await;
            return;
        }
        StageOutcome::CancelSilently => return,
    };

    // Stage 9.
    let session_id = deps
        .tracker
        .activate_session(
            &presentable.resolved.matched.request.trigger_name,
            PresentationOutcome::Paywall,
            Some(&presentable.resolved.content),
        )
        .await;

    // Stage 10.
    match stages::present(&presentable, session_id.is_some(), &deps, &mut cancel).await {
        StageOutcome::Next(()) => {}
        StageOutcome::Finish(terminal) => {
            let _ = sender.send(terminal).await;
            return;
        }
        StageOutcome::CancelSilently => return,
    }

    let info = presentable.resolved.content.info.clone();
    let _ = sender
        .send(PaywallState::Presented(info.clone()))
        .await;

    // Stage 11.
    stages::store_and_confirm(&presentable, &deps).await;
    let mut slot = deps.active_presentation.lock().await;
    *slot = Some(ActivePresentation {
        request: presentable.resolved.matched.request.clone(),
        info,
        sender,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::PresentationError;
    use crate::domain::models::{
        AudienceFilter, Experiment, PaywallContent, PaywallInfo, PresentationCondition,
        PreloadBehavior, ServerConfig, SkippedReason, Trigger, VariantOption, VariantType,
    };
    use crate::domain::ports::{
        NullAssignmentFeedback, NullDeliveryTransport, NullSessionCache, OverlayPresenterProvider,
        PresentResult, MatchAllEvaluator,
    };
    use crate::domain::ports::DurableAssignmentStore;
    use crate::services::delivery_queue::DeliveryQueue;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct StaticConfig(Option<ServerConfig>);

    #[async_trait]
    impl ConfigProvider for StaticConfig {
        async fn current_config(&self) -> Option<ServerConfig> {
            self.0.clone()
        }
    }

    struct ReadyEntitlements {
        subscribed: bool,
    }

    #[async_trait]
    impl EntitlementProvider for ReadyEntitlements {
        async fn status_known(&self) {}
        async fn is_subscribed(&self) -> bool {
            self.subscribed
        }
    }

    struct NeverReadyEntitlements;

    #[async_trait]
    impl EntitlementProvider for NeverReadyEntitlements {
        async fn status_known(&self) {
            std::future::pending::<()>().await;
        }
        async fn is_subscribed(&self) -> bool {
            false
        }
    }

    struct OkResolver;

    #[async_trait]
    impl ContentResolver for OkResolver {
        async fn resolve(
            &self,
            paywall_id: &str,
            _policy: crate::domain::models::CachePolicy,
            _overrides: &crate::domain::models::PaywallOverrides,
        ) -> Result<PaywallContent, crate::domain::error::ContentError> {
            Ok(PaywallContent {
                info: PaywallInfo {
                    database_id: format!("db-{paywall_id}"),
                    identifier: paywall_id.to_string(),
                    name: "Paywall".to_string(),
                    experiment_id: None,
                    variant_id: None,
                    presented_by_trigger: None,
                },
                presentation_condition: PresentationCondition::CheckUserSubscription,
                product_ids: vec![],
            })
        }

        async fn present(
            &self,
            _content: &PaywallContent,
            _presenter: &crate::domain::models::PresenterHandle,
        ) -> Result<PresentResult, crate::domain::error::ContentError> {
            Ok(PresentResult::Presented)
        }
    }

    struct MemoryStore;

    #[async_trait]
    impl DurableAssignmentStore for MemoryStore {
        async fn load(
            &self,
        ) -> anyhow::Result<HashMap<String, crate::domain::models::Variant>> {
            Ok(HashMap::new())
        }
        async fn save(
            &self,
            _assignments: &HashMap<String, crate::domain::models::Variant>,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn treatment_trigger(name: &str, experiment_id: &str, paywall_id: &str) -> Trigger {
        Trigger {
            placement_name: name.to_string(),
            audiences: vec![AudienceFilter {
                id: format!("{experiment_id}-audience"),
                expression: None,
                experiment: Experiment {
                    id: experiment_id.to_string(),
                    group_id: format!("{experiment_id}-group"),
                    variants: vec![VariantOption {
                        id: "v1".to_string(),
                        variant_type: VariantType::Treatment,
                        paywall_id: Some(paywall_id.to_string()),
                        weight: 100,
                    }],
                },
                preload: PreloadBehavior::Always,
            }],
        }
    }

    fn holdout_trigger(name: &str, experiment_id: &str) -> Trigger {
        Trigger {
            placement_name: name.to_string(),
            audiences: vec![AudienceFilter {
                id: format!("{experiment_id}-audience"),
                expression: None,
                experiment: Experiment {
                    id: experiment_id.to_string(),
                    group_id: format!("{experiment_id}-group"),
                    variants: vec![VariantOption {
                        id: "v1".to_string(),
                        variant_type: VariantType::Holdout,
                        paywall_id: None,
                        weight: 100,
                    }],
                },
                preload: PreloadBehavior::Always,
            }],
        }
    }

    fn config_with(triggers: Vec<Trigger>) -> ServerConfig {
        ServerConfig {
            request_id: Some("req1".to_string()),
            triggers,
            paywalls: vec![],
            preloading_disabled: Default::default(),
        }
    }

    fn deps(
        config: Option<ServerConfig>,
        entitlements: Arc<dyn EntitlementProvider>,
        timeouts: PipelineTimeouts,
    ) -> PipelineDeps {
        let queue = Arc::new(DeliveryQueue::new(
            Arc::new(NullDeliveryTransport),
            Arc::new(NullSessionCache),
        ));
        PipelineDeps {
            config: Arc::new(StaticConfig(config)),
            evaluator: Arc::new(MatchAllEvaluator),
            resolver: Arc::new(OkResolver),
            entitlements: Arc::clone(&entitlements),
            presenters: Arc::new(OverlayPresenterProvider),
            engine: Arc::new(AssignmentEngine::new(
                Arc::new(MemoryStore),
                Arc::new(NullAssignmentFeedback),
            )),
            tracker: Arc::new(SessionTracker::new(queue, entitlements)),
            presented: Arc::new(Mutex::new(false)),
            debug_session_active: Arc::new(AtomicBool::new(false)),
            active_presentation: Arc::new(Mutex::new(None)),
            timeouts,
        }
    }

    #[tokio::test]
    async fn test_entitlement_timeout_yields_skipped_timeout() {
        let deps = deps(
            Some(config_with(vec![])),
            Arc::new(NeverReadyEntitlements),
            PipelineTimeouts {
                entitlement_wait: Duration::from_millis(50),
                config_grace: Duration::from_millis(10),
            },
        );
        let mut stream = spawn(PresentationRequest::new("t"), deps);
        let state = stream.next_state().await;
        assert_eq!(
            state,
            Some(PaywallState::Skipped(SkippedReason::Error(
                PresentationError::Timeout
            )))
        );
        assert!(stream.next_state().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_config_yields_no_config() {
        let deps = deps(
            None,
            Arc::new(ReadyEntitlements { subscribed: false }),
            PipelineTimeouts {
                entitlement_wait: Duration::from_millis(50),
                config_grace: Duration::from_millis(10),
            },
        );
        let mut stream = spawn(PresentationRequest::new("t"), deps);
        assert_eq!(
            stream.next_state().await,
            Some(PaywallState::Skipped(SkippedReason::Error(
                PresentationError::NoConfig
            )))
        );
    }

    #[tokio::test]
    async fn test_holdout_skips_and_ends_session() {
        let deps = deps(
            Some(config_with(vec![holdout_trigger("t", "exp1")])),
            Arc::new(ReadyEntitlements { subscribed: false }),
            PipelineTimeouts::default(),
        );
        let mut stream = spawn(PresentationRequest::new("t"), deps.clone());
        let state = stream.next_state().await;
        assert!(matches!(
            state,
            Some(PaywallState::Skipped(SkippedReason::Holdout { .. }))
        ));
        assert!(deps.tracker.active_session_id().await.is_none());
        // Holdout assignments confirm immediately.
        let snapshot = deps.engine.snapshot().await;
        assert!(snapshot.confirmed.contains_key("exp1"));
    }

    #[tokio::test]
    async fn test_unknown_placement_skips_without_session() {
        let deps = deps(
            Some(config_with(vec![])),
            Arc::new(ReadyEntitlements { subscribed: false }),
            PipelineTimeouts::default(),
        );
        let mut stream = spawn(PresentationRequest::new("missing"), deps);
        assert_eq!(
            stream.next_state().await,
            Some(PaywallState::Skipped(SkippedReason::PlacementNotFound))
        );
    }

    #[tokio::test]
    async fn test_treatment_presents_then_confirms() {
        let deps = deps(
            Some(config_with(vec![treatment_trigger("t", "exp1", "pw1")])),
            Arc::new(ReadyEntitlements { subscribed: false }),
            PipelineTimeouts::default(),
        );
        {
            let snapshot = deps.engine.snapshot().await;
            assert!(snapshot.confirmed.is_empty());
        }

        let mut stream = spawn(PresentationRequest::new("t"), deps.clone());
        let state = stream.next_state().await;
        let Some(PaywallState::Presented(info)) = state else {
            panic!("expected Presented, got {state:?}");
        };
        assert_eq!(info.identifier, "pw1");
        assert_eq!(info.experiment_id.as_deref(), Some("exp1"));

        // Wait for stage 11 to land.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let snapshot = deps.engine.snapshot().await;
        assert!(snapshot.confirmed.contains_key("exp1"));
        assert!(deps.active_presentation.lock().await.is_some());
        assert!(*deps.presented.lock().await);
    }

    #[tokio::test]
    async fn test_subscribed_user_is_not_presented() {
        let deps = deps(
            Some(config_with(vec![treatment_trigger("t", "exp1", "pw1")])),
            Arc::new(ReadyEntitlements { subscribed: true }),
            PipelineTimeouts::default(),
        );
        let mut stream = spawn(PresentationRequest::new("t"), deps);
        assert_eq!(
            stream.next_state().await,
            Some(PaywallState::Skipped(SkippedReason::UserIsSubscribed))
        );
    }

    #[tokio::test]
    async fn test_debugger_gate_cancels_silently() {
        let deps = deps(
            Some(config_with(vec![treatment_trigger("t", "exp1", "pw1")])),
            Arc::new(ReadyEntitlements { subscribed: false }),
            PipelineTimeouts::default(),
        );
        deps.debug_session_active.store(true, Ordering::SeqCst);
        let mut stream = spawn(PresentationRequest::new("t"), deps);
        // No terminal state at all: the stream just closes.
        assert!(stream.next_state().await.is_none());
    }

    #[tokio::test]
    async fn test_second_request_rejected_while_presented() {
        let deps = deps(
            Some(config_with(vec![treatment_trigger("t", "exp1", "pw1")])),
            Arc::new(ReadyEntitlements { subscribed: false }),
            PipelineTimeouts::default(),
        );
        let mut first = spawn(PresentationRequest::new("t"), deps.clone());
        assert!(matches!(
            first.next_state().await,
            Some(PaywallState::Presented(_))
        ));

        let mut second = spawn(PresentationRequest::new("t"), deps);
        assert_eq!(
            second.next_state().await,
            Some(PaywallState::Skipped(SkippedReason::Error(
                PresentationError::AlreadyPresented
            )))
        );
    }
}
