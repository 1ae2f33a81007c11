//! Role kinds that aggregate rules from role templates.
//!
//! The four kinds share one shape (`rules` plus an optional
//! `aggregationRoleTemplates`) and differ only in scope.

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::AggregationRoleTemplates;

/// GlobalRole grants permissions across every cluster and workspace.
///
/// Example:
/// ```yaml
/// apiVersion: iam.kubesphere.io/v1beta1
/// kind: GlobalRole
/// metadata:
///   name: platform-viewer
///   annotations:
///     iam.kubesphere.io/auto-aggregate: "true"
/// spec:
///   aggregationRoleTemplates:
///     roleSelectors:
///       - matchLabels:
///           tier: x
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1beta1",
    kind = "GlobalRole",
    plural = "globalroles",
    shortname = "gr",
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRoleSpec {
    /// Effective policy rules.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    /// Templates aggregated into `rules`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_role_templates: Option<AggregationRoleTemplates>,
}

/// ClusterRole grants permissions within a single member cluster.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1beta1",
    kind = "ClusterRole",
    plural = "clusterroles",
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleSpec {
    /// Effective policy rules.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    /// Templates aggregated into `rules`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_role_templates: Option<AggregationRoleTemplates>,
}

/// Role grants permissions within one namespace.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1beta1",
    kind = "Role",
    plural = "roles",
    namespaced,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    /// Effective policy rules.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    /// Templates aggregated into `rules`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_role_templates: Option<AggregationRoleTemplates>,
}

/// WorkspaceRole grants permissions within a workspace.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1beta1",
    kind = "WorkspaceRole",
    plural = "workspaceroles",
    shortname = "wsr",
    printcolumn = r#"{"name":"Workspace", "type":"string", "jsonPath":".metadata.labels.kubesphere\\.io/workspace"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRoleSpec {
    /// Effective policy rules.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    /// Templates aggregated into `rules`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_role_templates: Option<AggregationRoleTemplates>,
}
