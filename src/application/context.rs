//! The top-level SDK context.
//!
//! One `Tollgate` is constructed per host-application lifetime and owns the
//! assignment engine, session tracker, and delivery queue. Collaborators
//! are injected through the builder; nothing in the crate reaches for
//! ambient globals.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::adapters::{JsonFileAssignmentStore, JsonFileSessionCache};
use crate::domain::models::{
    AppSession, CachePolicy, DismissedResult, EventValue, PaywallState, PresentationRequest,
    ServerConfig,
};
use crate::domain::ports::{
    AssignmentFeedback, ConfigProvider, ContentResolver, DeliveryTransport,
    DurableAssignmentStore, EntitlementProvider, MatchAllEvaluator, NullAssignmentFeedback,
    NullDeliveryTransport, OverlayPresenterProvider, PresenterProvider, RuleEvaluator,
    SessionCache,
};
use crate::infrastructure::config::TollgateOptions;
use crate::services::assignment_engine::{filter_triggers, AssignmentEngine, ServerAssignment};
use crate::services::delivery_queue::DeliveryQueue;
use crate::services::pipeline::{self, ActivePresentation, PaywallStream, PipelineDeps};
use crate::services::session_tracker::SessionTracker;

/// Builder for [`Tollgate`]. Config, content, and entitlement collaborators
/// are required; everything else has a sensible default.
pub struct TollgateBuilder {
    options: TollgateOptions,
    config: Arc<dyn ConfigProvider>,
    resolver: Arc<dyn ContentResolver>,
    entitlements: Arc<dyn EntitlementProvider>,
    evaluator: Arc<dyn RuleEvaluator>,
    presenters: Arc<dyn PresenterProvider>,
    store: Option<Arc<dyn DurableAssignmentStore>>,
    session_cache: Option<Arc<dyn SessionCache>>,
    transport: Arc<dyn DeliveryTransport>,
    feedback: Arc<dyn AssignmentFeedback>,
}

impl TollgateBuilder {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        resolver: Arc<dyn ContentResolver>,
        entitlements: Arc<dyn EntitlementProvider>,
    ) -> Self {
        Self {
            options: TollgateOptions::default(),
            config,
            resolver,
            entitlements,
            evaluator: Arc::new(MatchAllEvaluator),
            presenters: Arc::new(OverlayPresenterProvider),
            store: None,
            session_cache: None,
            transport: Arc::new(NullDeliveryTransport),
            feedback: Arc::new(NullAssignmentFeedback),
        }
    }

    pub fn with_options(mut self, options: TollgateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_presenters(mut self, presenters: Arc<dyn PresenterProvider>) -> Self {
        self.presenters = presenters;
        self
    }

    pub fn with_assignment_store(mut self, store: Arc<dyn DurableAssignmentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_session_cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.session_cache = Some(cache);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn DeliveryTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn AssignmentFeedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn build(self) -> Tollgate {
        let store = self.store.unwrap_or_else(|| {
            Arc::new(JsonFileAssignmentStore::new(
                self.options.storage.assignments_path.clone(),
            )) as Arc<dyn DurableAssignmentStore>
        });
        let session_cache = self.session_cache.unwrap_or_else(|| {
            Arc::new(JsonFileSessionCache::new(
                self.options.storage.session_cache_path.clone(),
            )) as Arc<dyn SessionCache>
        });

        let queue = Arc::new(DeliveryQueue::new(self.transport, session_cache));
        let tracker = Arc::new(SessionTracker::new(
            Arc::clone(&queue),
            Arc::clone(&self.entitlements),
        ));
        let engine = Arc::new(AssignmentEngine::new(store, self.feedback));

        Tollgate {
            options: self.options,
            config: self.config,
            evaluator: self.evaluator,
            resolver: self.resolver,
            entitlements: self.entitlements,
            presenters: self.presenters,
            engine,
            tracker,
            queue,
            presented: Arc::new(Mutex::new(false)),
            debug_session_active: Arc::new(AtomicBool::new(false)),
            active_presentation: Arc::new(Mutex::new(None)),
            user_attributes: Mutex::new(BTreeMap::new()),
            app_session: Mutex::new(AppSession::new()),
            flush_task: std::sync::Mutex::new(None),
        }
    }
}

/// The SDK context. See the crate docs for the overall flow.
pub struct Tollgate {
    options: TollgateOptions,
    config: Arc<dyn ConfigProvider>,
    evaluator: Arc<dyn RuleEvaluator>,
    resolver: Arc<dyn ContentResolver>,
    entitlements: Arc<dyn EntitlementProvider>,
    presenters: Arc<dyn PresenterProvider>,
    engine: Arc<AssignmentEngine>,
    tracker: Arc<SessionTracker>,
    queue: Arc<DeliveryQueue>,
    presented: Arc<Mutex<bool>>,
    debug_session_active: Arc<AtomicBool>,
    active_presentation: Arc<Mutex<Option<ActivePresentation>>>,
    user_attributes: Mutex<BTreeMap<String, EventValue>>,
    app_session: Mutex<AppSession>,
    flush_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Tollgate {
    pub fn builder(
        config: Arc<dyn ConfigProvider>,
        resolver: Arc<dyn ContentResolver>,
        entitlements: Arc<dyn EntitlementProvider>,
    ) -> TollgateBuilder {
        TollgateBuilder::new(config, resolver, entitlements)
    }

    /// Loads persisted state and starts the delivery timer. Call once,
    /// early, from within the runtime.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.engine.load_from_disk().await?;
        self.queue.restore_persisted().await;

        let handle = self.queue.start(self.options.flush_interval());
        let mut task = self
            .flush_task
            .lock()
            .map_err(|_| anyhow::anyhow!("flush task lock poisoned"))?;
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Call whenever a config snapshot lands: rerolls assignments and
    /// recreates the pending trigger sessions.
    pub async fn on_config_loaded(&self, config: &ServerConfig) {
        self.engine.reroll_assignments(&config.triggers).await;

        let user_attributes = self.user_attributes.lock().await.clone();
        let app_session = self.app_session.lock().await.clone();
        self.tracker
            .create_sessions(config, user_attributes, app_session)
            .await;
        tracing::info!(
            trigger_count = config.triggers.len(),
            "Config loaded; sessions and assignments refreshed"
        );
    }

    /// Reconciles server-reported assignments. Server state wins.
    pub async fn reconcile_server_assignments(&self, assignments: &[ServerAssignment]) {
        let Some(config) = self.config.current_config().await else {
            tracing::warn!("Cannot reconcile assignments without a config");
            return;
        };
        self.engine
            .reconcile_from_server(assignments, &config.triggers)
            .await;
    }

    /// The public presentation entry point. Returns a stream of states; the
    /// single terminal state reports how the request resolved. Dropping the
    /// stream cancels the request.
    pub fn present(&self, request: PresentationRequest) -> PaywallStream {
        pipeline::spawn(request, self.pipeline_deps())
    }

    /// Replays the most recent presented request with fresh content, for
    /// "try again" flows after a failed purchase. `None` when nothing is
    /// currently presented.
    pub async fn present_again(&self) -> Option<PaywallStream> {
        let previous = self.active_presentation.lock().await.take()?;
        self.tracker.track_paywall_close().await;
        *self.presented.lock().await = false;

        let request = previous.request.with_cache_policy(CachePolicy::FreshFetch);
        Some(self.present(request))
    }

    /// Reports that the presented paywall left the screen. Emits the
    /// terminal `Dismissed` state and closes the request's stream. No-op
    /// when nothing is presented.
    pub async fn dismiss(&self, result: DismissedResult) {
        let Some(active) = self.active_presentation.lock().await.take() else {
            return;
        };
        self.tracker.track_paywall_close().await;
        *self.presented.lock().await = false;

        let state = PaywallState::Dismissed(active.info, result);
        if active.sender.send(state).await.is_err() {
            tracing::debug!("Paywall stream dropped before dismissal");
        }
    }

    /// Paywall ids the host should preload now, honouring remote preload
    /// switches and per-audience preload policy.
    pub async fn active_preload_paywall_ids(&self) -> HashSet<String> {
        let Some(config) = self.config.current_config().await else {
            return HashSet::new();
        };
        let preloadable = filter_triggers(&config.triggers, &config.preloading_disabled);
        self.engine
            .all_active_treatment_paywall_ids(&preloadable, self.evaluator.as_ref())
            .await
    }

    pub async fn active_session_id(&self) -> Option<String> {
        self.tracker.active_session_id().await
    }

    /// Marks the debug-preview session; while set, only requests flagged
    /// `from_debugger` may present.
    pub fn set_debug_session_active(&self, active: bool) {
        self.debug_session_active.store(active, Ordering::SeqCst);
    }

    pub async fn set_user_attributes(&self, attributes: BTreeMap<String, EventValue>) {
        *self.user_attributes.lock().await = attributes;
    }

    /// Starts a new app session and stamps it onto tracked sessions.
    pub async fn update_app_session(&self) {
        let session = AppSession::new();
        *self.app_session.lock().await = session.clone();
        self.tracker.update_app_session(session).await;
    }

    pub async fn did_enter_background(&self) {
        self.tracker.did_enter_background().await;
        self.queue.will_resign_active().await;
    }

    pub async fn will_enter_foreground(&self) {
        self.tracker.will_enter_foreground().await;
    }

    /// The session tracker, for sub-phase and transaction tracking calls.
    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    pub fn engine(&self) -> &Arc<AssignmentEngine> {
        &self.engine
    }

    pub fn queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }

    fn pipeline_deps(&self) -> PipelineDeps {
        PipelineDeps {
            config: Arc::clone(&self.config),
            evaluator: Arc::clone(&self.evaluator),
            resolver: Arc::clone(&self.resolver),
            entitlements: Arc::clone(&self.entitlements),
            presenters: Arc::clone(&self.presenters),
            engine: Arc::clone(&self.engine),
            tracker: Arc::clone(&self.tracker),
            presented: Arc::clone(&self.presented),
            debug_session_active: Arc::clone(&self.debug_session_active),
            active_presentation: Arc::clone(&self.active_presentation),
            timeouts: self.options.pipeline_timeouts(),
        }
    }
}

impl Drop for Tollgate {
    fn drop(&mut self) {
        if let Ok(mut task) = self.flush_task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}
