//! Resolution of a role's aggregation references into policy rules.
//!
//! Given the owner's scope key and its `aggregationRoleTemplates`, this
//! module finds the matching RoleTemplates and concatenates their rules,
//! dropping rules structurally equal to one already collected. Order of
//! first occurrence is preserved.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::rbac::v1::PolicyRule;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use kube::core::Selector;
use tracing::{debug, info};

use crate::controller::client::KubeClient;
use crate::controller::error::Result;
use crate::crd::AggregationRoleTemplates;

/// Why a referenced template contributed nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No RoleTemplate with that name exists.
    NotFound,
    /// The template lacks the owner's scope label.
    ScopeMismatch,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NotFound => "NotFound",
            SkipReason::ScopeMismatch => "ScopeMismatch",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of resolving an aggregation reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedAggregation {
    /// Deduplicated rules in first-occurrence order.
    pub rules: Vec<PolicyRule>,
    /// Template names to record on the owner.
    pub template_names: Vec<String>,
    /// Explicitly named templates that were skipped.
    pub skipped: Vec<(String, SkipReason)>,
}

/// Append `rules` to `target`, skipping any rule already present.
///
/// Returns how many rules were appended.
pub fn merge_rules<I>(target: &mut Vec<PolicyRule>, rules: I) -> usize
where
    I: IntoIterator<Item = PolicyRule>,
{
    let mut added = 0;
    for rule in rules {
        if !target.contains(&rule) {
            target.push(rule);
            added += 1;
        }
    }
    added
}

/// Convert a user selector into a query that also requires `scope_key`.
///
/// The scope requirement is merged into `matchLabels` with an empty value,
/// replacing any user-provided value for that key.
pub fn scoped_selector(selector: &LabelSelector, scope_key: &str) -> Result<Selector> {
    let mut selector = selector.clone();
    selector
        .match_labels
        .get_or_insert_with(BTreeMap::new)
        .insert(scope_key.to_string(), String::new());
    Ok(Selector::try_from(selector)?)
}

/// Resolve `aggregation` for an owner whose kind requires `scope_key`.
///
/// Non-empty selectors take precedence over `templateNames`. A template
/// referenced by name that is missing or out of scope is skipped. Any
/// other API error aborts resolution.
pub async fn resolve_aggregation(
    client: &dyn KubeClient,
    scope_key: &str,
    aggregation: &AggregationRoleTemplates,
) -> Result<ResolvedAggregation> {
    let selectors = aggregation.selectors();
    if selectors.is_empty() {
        resolve_by_name(client, scope_key, &aggregation.template_names).await
    } else {
        resolve_by_selectors(client, scope_key, &selectors).await
    }
}

async fn resolve_by_selectors(
    client: &dyn KubeClient,
    scope_key: &str,
    selectors: &[&LabelSelector],
) -> Result<ResolvedAggregation> {
    let mut resolved = ResolvedAggregation::default();
    for selector in selectors {
        let query = scoped_selector(selector, scope_key)?;
        let templates = client.list_role_templates(&query).await?;
        debug!(
            selector = ?query,
            matched = templates.len(),
            "Listed role templates for selector"
        );
        for template in templates {
            let name = template.name_any();
            if !resolved.template_names.contains(&name) {
                resolved.template_names.push(name);
            }
            merge_rules(&mut resolved.rules, template.spec.rules);
        }
    }
    Ok(resolved)
}

async fn resolve_by_name(
    client: &dyn KubeClient,
    scope_key: &str,
    names: &[String],
) -> Result<ResolvedAggregation> {
    let mut resolved = ResolvedAggregation {
        template_names: names.to_vec(),
        ..ResolvedAggregation::default()
    };
    for name in names {
        let Some(template) = client.get_role_template(name).await? else {
            info!(template = %name, "Role template not found, skipping");
            resolved.skipped.push((name.clone(), SkipReason::NotFound));
            continue;
        };
        if !template.has_scope(scope_key) {
            info!(
                template = %name,
                scope = %scope_key,
                "Role template is not labeled for this scope, skipping"
            );
            resolved.skipped.push((name.clone(), SkipReason::ScopeMismatch));
            continue;
        }
        merge_rules(&mut resolved.rules, template.spec.rules);
    }
    Ok(resolved)
}
