//! Push-direction aggregation for RoleTemplate changes.
//!
//! When a globally scoped RoleTemplate is created or updated, GlobalRoles
//! annotated for auto-aggregation whose selectors match the template's
//! labels receive its rules and record its name. This appends; it does not
//! recompute the role's full aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, info, warn};

use crate::controller::aggregation::merge_rules;
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::role_reconciler::{
    ACTION_AGGREGATE, MESSAGE_SYNCED, REASON_AGGREGATE_FAILED, REASON_SYNCED, requeue_action,
    retry_key,
};
use crate::controller::rule_owner::RuleOwner;
use crate::crd::{GlobalRole, RoleTemplate, SCOPE_GLOBAL};

const KIND: &str = "RoleTemplate";

/// Whether every `matchLabels` entry of `selector` is present in `labels`.
///
/// Only `matchLabels` is consulted; `matchExpressions` are ignored, and a
/// selector without `matchLabels` matches every template.
///
/// The pull direction evaluates full selector semantics and requires the
/// scope label with an empty value, so it can disagree with this match. A
/// template pushed through an expression-only selector is dropped from
/// `templateNames` by the next role reconcile while its rules stay (they
/// are still covered), and the next template reconcile pushes it again.
pub fn match_labels_subset(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    selector
        .match_labels
        .iter()
        .flatten()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Fold `template` into `role` if one of its selectors matches.
///
/// Returns the modified role, or `None` when the role does not take this
/// template (no aggregation, already recorded, or no selector matches).
pub fn push_template(role: &GlobalRole, template: &RoleTemplate) -> Option<GlobalRole> {
    let aggregation = role.spec.aggregation_role_templates.as_ref()?;
    let template_name = template.name_any();
    if aggregation.template_names.contains(&template_name) {
        return None;
    }

    let labels = template.labels();
    let matched = aggregation
        .role_selector
        .iter()
        .chain(aggregation.role_selectors.iter())
        .any(|selector| match_labels_subset(selector, labels));
    if !matched {
        return None;
    }

    let mut updated = role.clone();
    merge_rules(&mut updated.spec.rules, template.spec.rules.iter().cloned());
    if let Some(aggregation) = updated.spec.aggregation_role_templates.as_mut() {
        aggregation.template_names.push(template_name);
    }
    Some(updated)
}

/// Push `template` into every matching auto-aggregate GlobalRole.
///
/// Returns the number of roles updated. The first failed update aborts the
/// pass; roles already updated keep the change, and a retry skips them
/// because their template names now include the template.
pub async fn aggregate_into_global_roles(template: &RoleTemplate, ctx: &Context) -> Result<usize> {
    let template_name = template.name_any();
    if !template.has_scope(SCOPE_GLOBAL) {
        debug!(template = %template_name, "Role template is not globally scoped, skipping");
        return Ok(0);
    }

    let candidates = ctx.client.list_auto_aggregate_global_roles().await?;
    let mut updated_count = 0;
    for role in candidates {
        let Some(updated) = push_template(&role, template) else {
            continue;
        };

        let owner = RuleOwner::from(updated);
        let role_name = owner.name();
        info!(
            template = %template_name,
            role = %role_name,
            "Aggregating role template into global role"
        );
        if let Err(e) = ctx.client.update_owner(&owner).await {
            warn!(template = %template_name, role = %role_name, error = %e, "Failed to update global role");
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
            health_state.metrics.record_role_update(owner.kind().as_str());
        }
        ctx.publish_normal_event(
            &owner.object_ref(),
            REASON_SYNCED,
            ACTION_AGGREGATE,
            Some(MESSAGE_SYNCED.to_string()),
        )
        .await;
        updated_count += 1;
    }

    Ok(updated_count)
}

/// Reconcile a RoleTemplate
pub async fn reconcile(obj: Arc<RoleTemplate>, ctx: Arc<Context>) -> Result<Action> {
    let start_time = Instant::now();
    let name = obj.name_any();

    debug!(name = %name, "Reconciling RoleTemplate");

    let updated = aggregate_into_global_roles(&obj, &ctx).await?;
    if updated > 0 {
        info!(name = %name, roles = updated, "Pushed role template into global roles");
    }

    ctx.retries.reset(&retry_key(obj.as_ref()));
    if let Some(ref health_state) = ctx.health_state {
        health_state
            .metrics
            .record_reconcile(KIND, &name, start_time.elapsed().as_secs_f64());
    }

    Ok(Action::await_change())
}

/// Error policy for the RoleTemplate controller
pub fn error_policy(obj: Arc<RoleTemplate>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(KIND, &name);
    }

    requeue_action(&retry_key(obj.as_ref()), KIND, &name, error, &ctx)
}
