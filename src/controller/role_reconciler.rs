//! Reconciliation loop shared by the four role kinds.
//!
//! Each reconcile fetches the role fresh from the API server, resolves its
//! aggregation references, and writes the role back only when the resolved
//! rules are not already covered or the template-name list changed.

use std::sync::Arc;
use std::time::Instant;

use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::controller::aggregation::resolve_aggregation;
use crate::controller::context::Context;
use crate::controller::covers::AggregationDiff;
use crate::controller::error::{Error, Result};
use crate::controller::retry::RetryDecision;
use crate::controller::rule_owner::{AggregatingRole, OwnerKind};

/// Event reason for a failed aggregation or write
pub const REASON_AGGREGATE_FAILED: &str = "AggregateRoleTemplateFailed";

/// Event reason for a successful write
pub const REASON_SYNCED: &str = "Synced";

/// Event message for a successful write
pub const MESSAGE_SYNCED: &str = "Aggregating roleTemplates successfully";

/// Event action recorded on aggregation events
pub const ACTION_AGGREGATE: &str = "AggregateRoleTemplates";

/// How a reconcile pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The role no longer exists.
    NotFound,
    /// The role has no aggregation references.
    NotAggregated,
    /// The role already reflects its templates.
    UpToDate,
    /// The role was written back.
    Updated,
}

/// Reconcile one role through the shared aggregation pipeline.
pub async fn reconcile_owner(
    kind: OwnerKind,
    namespace: Option<&str>,
    name: &str,
    ctx: &Context,
) -> Result<ReconcileOutcome> {
    let Some(owner) = ctx.client.get_owner(kind, namespace, name).await? else {
        debug!(kind = %kind, name = %name, "Role not found (likely deleted)");
        return Ok(ReconcileOutcome::NotFound);
    };

    let Some(aggregation) = owner.aggregation_rule().cloned() else {
        debug!(kind = %kind, name = %name, "Role does not aggregate templates");
        return Ok(ReconcileOutcome::NotAggregated);
    };

    let resolved =
        match resolve_aggregation(ctx.client.as_ref(), owner.scope_key(), &aggregation).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(kind = %kind, name = %name, error = %e, "Failed to aggregate role templates");
                ctx.publish_warning_event(
                    &owner.object_ref(),
                    REASON_AGGREGATE_FAILED,
                    ACTION_AGGREGATE,
                    Some(e.to_string()),
                )
                .await;
                return Err(e);
            }
        };

    if let Some(ref health_state) = ctx.health_state {
        for (_, reason) in &resolved.skipped {
            health_state.metrics.record_template_skipped(reason.as_str());
        }
    }

    let diff = AggregationDiff::compute(&owner, &resolved);
    let Some(updated) = diff.apply(&owner, &resolved) else {
        debug!(kind = %kind, name = %name, "Role already up to date");
        return Ok(ReconcileOutcome::UpToDate);
    };

    info!(
        kind = %kind,
        name = %name,
        missing_rules = diff.missing_rules.len(),
        template_names_changed = diff.template_names_changed,
        "Updating aggregated role"
    );

    if let Err(e) = ctx.client.update_owner(&updated).await {
        warn!(kind = %kind, name = %name, error = %e, "Failed to update role");
        ctx.publish_warning_event(
            &owner.object_ref(),
            REASON_AGGREGATE_FAILED,
            ACTION_AGGREGATE,
            Some(e.to_string()),
        )
        .await;
        return Err(e);
    }

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_role_update(kind.as_str());
    }
    ctx.publish_normal_event(
        &owner.object_ref(),
        REASON_SYNCED,
        ACTION_AGGREGATE,
        Some(MESSAGE_SYNCED.to_string()),
    )
    .await;

    Ok(ReconcileOutcome::Updated)
}

/// Reconcile a role of kind `K`
///
/// Entry point handed to the kube runtime controller for each role kind.
pub async fn reconcile<K: AggregatingRole>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace();

    debug!(kind = %K::KIND, name = %name, namespace = ?namespace, "Reconciling role");

    let outcome = reconcile_owner(K::KIND, namespace.as_deref(), &name, &ctx).await?;

    ctx.retries.reset(&retry_key(obj.as_ref()));
    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_reconcile(
            K::KIND.as_str(),
            &name,
            start_time.elapsed().as_secs_f64(),
        );
    }

    debug!(kind = %K::KIND, name = %name, outcome = ?outcome, "Reconciled role");
    Ok(Action::await_change())
}

/// Error policy for the role controllers
pub fn error_policy<K: AggregatingRole>(obj: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(K::KIND.as_str(), &name);
    }

    requeue_action(&retry_key(obj.as_ref()), K::KIND.as_str(), &name, error, &ctx)
}

/// Key under which retries for `obj` are counted.
pub fn retry_key<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    ObjectRef::from_obj(obj).to_string()
}

/// Choose the requeue for a failed reconcile of `key`.
pub(crate) fn requeue_action(
    key: &str,
    kind: &str,
    name: &str,
    error: &Error,
    ctx: &Context,
) -> Action {
    if error.is_not_found() {
        debug!(kind = %kind, name = %name, "Resource not found (likely deleted)");
        ctx.retries.reset(key);
        return Action::await_change();
    }

    match ctx.retries.record_failure(key) {
        RetryDecision::Retry(retry_count) => {
            let backoff = error.requeue_after_with_retry_count(retry_count);
            warn!(
                kind = %kind,
                name = %name,
                error = %error,
                retry_count = retry_count,
                backoff_ms = backoff.as_millis() as u64,
                "Retryable error, will retry with exponential backoff"
            );
            Action::requeue(backoff)
        }
        RetryDecision::GiveUp => {
            error!(
                kind = %kind,
                name = %name,
                error = %error,
                "Retry budget exhausted, dropping until the object changes"
            );
            Action::await_change()
        }
    }
}
