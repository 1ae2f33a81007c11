//! Decide whether a role must be rewritten after aggregation.
//!
//! A role whose rules already contain every resolved rule, and whose
//! recorded template names are unchanged, is left alone. When a rewrite is
//! needed the rules are replaced with the resolved set, not unioned, so
//! rules added by hand to an aggregating role do not survive a rewrite.

use k8s_openapi::api::rbac::v1::PolicyRule;

use crate::controller::aggregation::ResolvedAggregation;
use crate::controller::rule_owner::RuleOwner;

/// Whether every rule in `proposed` is structurally present in `current`.
///
/// Returns the coverage flag and the rules of `proposed` missing from
/// `current`, in their original order.
pub fn covers(current: &[PolicyRule], proposed: &[PolicyRule]) -> (bool, Vec<PolicyRule>) {
    let missing: Vec<PolicyRule> = proposed
        .iter()
        .filter(|rule| !current.contains(rule))
        .cloned()
        .collect();
    (missing.is_empty(), missing)
}

/// Difference between a role and its freshly resolved aggregation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregationDiff {
    /// Resolved rules absent from the role.
    pub missing_rules: Vec<PolicyRule>,
    /// Whether the recorded template-name list differs (order-sensitive).
    pub template_names_changed: bool,
}

impl AggregationDiff {
    /// Compare `owner` against `resolved`.
    pub fn compute(owner: &RuleOwner, resolved: &ResolvedAggregation) -> Self {
        let (_, missing_rules) = covers(owner.rules(), &resolved.rules);
        let recorded = owner
            .aggregation_rule()
            .map(|a| a.template_names.as_slice())
            .unwrap_or_default();
        Self {
            missing_rules,
            template_names_changed: recorded != resolved.template_names.as_slice(),
        }
    }

    pub fn rules_covered(&self) -> bool {
        self.missing_rules.is_empty()
    }

    pub fn needs_update(&self) -> bool {
        !self.rules_covered() || self.template_names_changed
    }

    /// Produce the object to write, or `None` when `owner` is current.
    ///
    /// `owner` is not modified; the returned copy carries the changes.
    pub fn apply(&self, owner: &RuleOwner, resolved: &ResolvedAggregation) -> Option<RuleOwner> {
        if !self.needs_update() {
            return None;
        }
        let mut updated = owner.clone();
        if !self.rules_covered() {
            updated.set_rules(resolved.rules.clone());
        }
        if self.template_names_changed {
            let mut aggregation = updated.aggregation_rule().cloned().unwrap_or_default();
            aggregation.template_names = resolved.template_names.clone();
            updated.set_aggregation_rule(Some(aggregation));
        }
        Some(updated)
    }
}
