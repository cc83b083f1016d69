//! The individual pipeline stages, in presentation order.
//!
//! Only three stages may suspend on external work: the prerequisite wait,
//! content resolution, and the present call. Every suspension races the
//! cancellation signal; a cancelled request that already opened a session
//! closes it before terminating.

use std::sync::atomic::Ordering;

use tokio::sync::watch;

use crate::domain::error::{ContentError, PresentationError};
use crate::domain::models::{
    PaywallState, PresentationOutcome, PresentationRequest, SkippedReason, TriggerResult,
};
use crate::domain::ports::PresentResult;

use super::state::{Evaluable, Matched, Presentable, Resolved, StageOutcome};
use super::PipelineDeps;

/// Resolves when the caller cancels. Never resolves if the handle was
/// leaked without cancelling.
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn skipped(reason: SkippedReason) -> PaywallState {
    PaywallState::Skipped(reason)
}

fn skipped_error(error: PresentationError) -> PaywallState {
    skipped(SkippedReason::Error(error))
}

/// Stage 1: wait for subscription status and a config snapshot, bounded.
///
/// The entitlement wait has a hard timeout; a missing config gets one grace
/// window and one re-check before the request fails.
pub(super) async fn await_prerequisites(
    request: &PresentationRequest,
    deps: &PipelineDeps,
    cancel: &mut watch::Receiver<bool>,
) -> StageOutcome<Evaluable> {
    let status_wait = tokio::time::timeout(
        deps.timeouts.entitlement_wait,
        deps.entitlements.status_known(),
    );
    tokio::select! {
        () = wait_cancelled(cancel) => {
            return StageOutcome::Finish(skipped_error(PresentationError::Cancelled));
        }
        outcome = status_wait => {
            if outcome.is_err() {
                tracing::error!(
                    trigger_name = %request.trigger_name,
                    timeout_secs = deps.timeouts.entitlement_wait.as_secs(),
                    "Timed out waiting for subscription status"
                );
                return StageOutcome::Finish(skipped_error(PresentationError::Timeout));
            }
        }
    }

    if let Some(config) = deps.config.current_config().await {
        return StageOutcome::Next(Evaluable {
            request: request.clone(),
            config,
        });
    }

    // One grace window, one re-check.
    tokio::select! {
        () = wait_cancelled(cancel) => {
            return StageOutcome::Finish(skipped_error(PresentationError::Cancelled));
        }
        () = tokio::time::sleep(deps.timeouts.config_grace) => {}
    }
    match deps.config.current_config().await {
        Some(config) => StageOutcome::Next(Evaluable {
            request: request.clone(),
            config,
        }),
        None => {
            tracing::warn!(
                trigger_name = %request.trigger_name,
                "No config available after grace window"
            );
            StageOutcome::Finish(skipped_error(PresentationError::NoConfig))
        }
    }
}

/// Stage 2: snapshot the request for diagnostics. Pure, never terminates.
pub(super) fn log_request(state: &Evaluable) {
    tracing::debug!(
        trigger_name = %state.request.trigger_name,
        from_debugger = state.request.flags.from_debugger,
        cache_policy = ?state.request.cache_policy,
        trigger_count = state.config.triggers.len(),
        "Evaluating presentation request"
    );
}

/// Stage 3: debugger exclusivity. While a debug-preview session is active,
/// non-debugger requests vanish silently instead of skipping visibly.
pub(super) fn debugger_gate(state: Evaluable, deps: &PipelineDeps) -> StageOutcome<Evaluable> {
    if deps.debug_session_active.load(Ordering::SeqCst) && !state.request.flags.from_debugger {
        tracing::debug!(
            trigger_name = %state.request.trigger_name,
            "Debug session active; cancelling non-debugger request"
        );
        return StageOutcome::CancelSilently;
    }
    StageOutcome::Next(state)
}

/// Stage 4: evaluate the audience via the assignment engine.
pub(super) async fn evaluate_audience(state: &Evaluable, deps: &PipelineDeps) -> TriggerResult {
    let triggers = state.config.triggers_by_placement_name();
    deps.engine
        .trigger_outcome(
            triggers.get(&state.request.trigger_name),
            state.request.event.as_ref(),
            deps.evaluator.as_ref(),
        )
        .await
}

/// Stages 5 and 6: branch on the trigger result.
///
/// A holdout is final the moment it is chosen, so its assignment confirms
/// here; a treatment's confirmation waits until presentation actually
/// happened. Holdout and no-match open (and immediately end) a session;
/// unknown placements and evaluation errors never had one.
pub(super) async fn handle_trigger_result(
    state: Evaluable,
    result: TriggerResult,
    deps: &PipelineDeps,
) -> StageOutcome<Matched> {
    match result {
        TriggerResult::Paywall {
            experiment,
            variant,
        } => StageOutcome::Next(Matched {
            request: state.request,
            experiment,
            variant,
        }),
        TriggerResult::Holdout {
            experiment,
            variant,
        } => {
            deps.engine.confirm_assignment(&experiment.id, &variant).await;
            deps.tracker
                .activate_session(
                    &state.request.trigger_name,
                    PresentationOutcome::Holdout,
                    None,
                )
                .await;
            StageOutcome::Finish(skipped(SkippedReason::Holdout {
                experiment,
                variant,
            }))
        }
        TriggerResult::NoAudienceMatch => {
            deps.tracker
                .activate_session(
                    &state.request.trigger_name,
                    PresentationOutcome::NoAudienceMatch,
                    None,
                )
                .await;
            StageOutcome::Finish(skipped(SkippedReason::NoAudienceMatch))
        }
        TriggerResult::PlacementNotFound => {
            tracing::warn!(
                trigger_name = %state.request.trigger_name,
                "Trigger is not a placement in the current config"
            );
            StageOutcome::Finish(skipped(SkippedReason::PlacementNotFound))
        }
        TriggerResult::Error(cause) => {
            StageOutcome::Finish(skipped_error(PresentationError::Evaluation(cause)))
        }
    }
}

/// Stage 7: resolve paywall content through the resolver port.
///
/// Failures degrade to `UserIsSubscribed` when the user is already entitled;
/// a broken paywall must never block a paying user.
pub(super) async fn resolve_content(
    state: Matched,
    deps: &PipelineDeps,
    cancel: &mut watch::Receiver<bool>,
) -> StageOutcome<Resolved> {
    let paywall_id = state
        .request
        .overrides
        .paywall_id
        .clone()
        .or_else(|| state.variant.paywall_id.clone());
    let Some(paywall_id) = paywall_id else {
        tracing::error!(
            experiment_id = %state.experiment.id,
            variant_id = %state.variant.id,
            "Treatment variant carries no paywall id"
        );
        return StageOutcome::Finish(skipped_error(
            ContentError::Invalid("treatment variant carries no paywall id".to_string()).into(),
        ));
    };

    let resolve = deps.resolver.resolve(
        &paywall_id,
        state.request.cache_policy,
        &state.request.overrides,
    );
    let resolved = tokio::select! {
        () = wait_cancelled(cancel) => {
            return StageOutcome::Finish(skipped_error(PresentationError::Cancelled));
        }
        resolved = resolve => resolved,
    };

    match resolved {
        Ok(mut content) => {
            content.info.experiment_id = Some(state.experiment.id.clone());
            content.info.variant_id = Some(state.variant.id.clone());
            content.info.presented_by_trigger = Some(state.request.trigger_name.clone());
            StageOutcome::Next(Resolved {
                matched: state,
                content,
            })
        }
        Err(error) => {
            if deps.entitlements.is_subscribed().await {
                tracing::info!(
                    %paywall_id, %error,
                    "Content resolution failed for an entitled user; skipping quietly"
                );
                StageOutcome::Finish(skipped(SkippedReason::UserIsSubscribed))
            } else {
                tracing::warn!(%paywall_id, %error, "Content resolution failed");
                StageOutcome::Finish(skipped_error(error.into()))
            }
        }
    }
}

/// Stage 8: presentability check and presenter resolution.
pub(super) async fn check_presentability(
    state: Resolved,
    deps: &PipelineDeps,
) -> StageOutcome<Presentable> {
    use crate::domain::models::PresentationCondition;

    if state.content.presentation_condition == PresentationCondition::CheckUserSubscription
        && deps.entitlements.is_subscribed().await
    {
        tracing::debug!(
            paywall_id = %state.content.info.identifier,
            "User already subscribed; not presenting"
        );
        return StageOutcome::Finish(skipped(SkippedReason::UserIsSubscribed));
    }

    let presenter = match state.matched.request.presenter.clone() {
        Some(presenter) => Some(presenter),
        None => deps.presenters.overlay().await,
    };
    match presenter {
        Some(presenter) => StageOutcome::Next(Presentable {
            resolved: state,
            presenter,
        }),
        None => {
            tracing::warn!(
                paywall_id = %state.content.info.identifier,
                "No presenter available for paywall"
            );
            StageOutcome::Finish(skipped_error(PresentationError::NoPresenter))
        }
    }
}

/// Stage 10: the presented-flag gate and the present call.
///
/// The flag is checked and set inside one critical section so two racing
/// requests cannot both pass. When this request owns the session activated
/// in stage 9, every non-presented outcome closes it; a request whose
/// activation was a no-op must not close somebody else's session.
pub(super) async fn present(
    state: &Presentable,
    owns_session: bool,
    deps: &PipelineDeps,
    cancel: &mut watch::Receiver<bool>,
) -> StageOutcome<()> {
    let close_session = || async {
        if owns_session {
            deps.tracker.end_session().await;
        }
    };

    {
        let mut presented = deps.presented.lock().await;
        if *presented {
            tracing::info!(
                paywall_id = %state.resolved.content.info.identifier,
                "A paywall is already presented; rejecting request"
            );
            drop(presented);
            close_session().await;
            return StageOutcome::Finish(skipped_error(PresentationError::AlreadyPresented));
        }
        *presented = true;
    }

    let presenting = deps
        .resolver
        .present(&state.resolved.content, &state.presenter);
    let outcome = tokio::select! {
        () = wait_cancelled(cancel) => {
            release_presented_flag(deps).await;
            close_session().await;
            return StageOutcome::Finish(skipped_error(PresentationError::Cancelled));
        }
        outcome = presenting => outcome,
    };

    match outcome {
        Ok(PresentResult::Presented) => {
            deps.tracker.track_paywall_open().await;
            StageOutcome::Next(())
        }
        Ok(PresentResult::AlreadyPresented) => {
            release_presented_flag(deps).await;
            close_session().await;
            tracing::info!(
                paywall_id = %state.resolved.content.info.identifier,
                "Host reported another paywall on screen"
            );
            StageOutcome::Finish(skipped_error(PresentationError::AlreadyPresented))
        }
        Err(error) => {
            release_presented_flag(deps).await;
            close_session().await;
            if deps.entitlements.is_subscribed().await {
                tracing::info!(%error, "Present failed for an entitled user; skipping quietly");
                StageOutcome::Finish(skipped(SkippedReason::UserIsSubscribed))
            } else {
                tracing::warn!(%error, "Present failed");
                StageOutcome::Finish(skipped_error(error.into()))
            }
        }
    }
}

pub(super) async fn release_presented_flag(deps: &PipelineDeps) {
    *deps.presented.lock().await = false;
}

/// Stage 11: store the request for re-presentation and confirm the
/// treatment assignment, now that the paywall is certainly on screen.
pub(super) async fn store_and_confirm(state: &Presentable, deps: &PipelineDeps) {
    deps.engine
        .confirm_assignment(&state.resolved.matched.experiment.id, &state.resolved.matched.variant)
        .await;
    tracing::info!(
        paywall_id = %state.resolved.content.info.identifier,
        experiment_id = %state.resolved.matched.experiment.id,
        variant_id = %state.resolved.matched.variant.id,
        "Paywall presented; assignment confirmed"
    );
}
