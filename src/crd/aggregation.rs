//! Aggregation references shared by all role kinds.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label a RoleTemplate must carry to be aggregated into a GlobalRole.
pub const SCOPE_GLOBAL: &str = "scope.iam.kubesphere.io/global";

/// Label a RoleTemplate must carry to be aggregated into a ClusterRole.
pub const SCOPE_CLUSTER: &str = "scope.iam.kubesphere.io/cluster";

/// Label a RoleTemplate must carry to be aggregated into a namespaced Role.
pub const SCOPE_NAMESPACE: &str = "scope.iam.kubesphere.io/namespace";

/// Label a RoleTemplate must carry to be aggregated into a WorkspaceRole.
pub const SCOPE_WORKSPACE: &str = "scope.iam.kubesphere.io/workspace";

/// Annotation marking a GlobalRole as a target for newly created templates.
pub const AUTO_AGGREGATE_ANNOTATION: &str = "iam.kubesphere.io/auto-aggregate";

/// References from a role to the templates it aggregates.
///
/// When any selector is non-empty the selectors decide membership and
/// `templateNames` is overwritten with the resolved names. Otherwise the
/// explicit `templateNames` list is used as is.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRoleTemplates {
    /// Explicit template names, in aggregation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_names: Vec<String>,

    /// Single label selector (ClusterRole, Role, WorkspaceRole).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_selector: Option<LabelSelector>,

    /// Multiple label selectors (GlobalRole).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_selectors: Vec<LabelSelector>,
}

impl AggregationRoleTemplates {
    /// Aggregate an explicit list of templates.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            template_names: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Aggregate every template matching `match_labels`.
    pub fn from_match_labels(match_labels: BTreeMap<String, String>) -> Self {
        Self {
            role_selector: Some(LabelSelector {
                match_labels: Some(match_labels),
                match_expressions: None,
            }),
            ..Self::default()
        }
    }

    /// All non-empty selectors, singular first.
    pub fn selectors(&self) -> Vec<&LabelSelector> {
        self.role_selector
            .iter()
            .chain(self.role_selectors.iter())
            .filter(|s| !selector_is_empty(s))
            .collect()
    }

    /// Whether resolution goes through label selectors.
    pub fn uses_selectors(&self) -> bool {
        !self.selectors().is_empty()
    }
}

/// A selector with neither match labels nor match expressions.
pub fn selector_is_empty(selector: &LabelSelector) -> bool {
    selector.match_labels.as_ref().is_none_or(BTreeMap::is_empty)
        && selector
            .match_expressions
            .as_ref()
            .is_none_or(Vec::is_empty)
}
