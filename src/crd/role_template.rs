//! RoleTemplate Custom Resource Definition.

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// RoleTemplate is a named, labeled bundle of policy rules that roles
/// aggregate by name or by label selector.
///
/// Example:
/// ```yaml
/// apiVersion: iam.kubesphere.io/v1beta1
/// kind: RoleTemplate
/// metadata:
///   name: view-pods
///   labels:
///     scope.iam.kubesphere.io/global: ""
///     tier: x
/// spec:
///   rules:
///     - apiGroups: [""]
///       resources: ["pods"]
///       verbs: ["get", "list"]
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.kubesphere.io",
    version = "v1beta1",
    kind = "RoleTemplate",
    plural = "roletemplates",
    shortname = "rt",
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RoleTemplateSpec {
    /// Rules contributed to every role that aggregates this template.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl RoleTemplate {
    /// Whether this template carries the given scope label (any value).
    pub fn has_scope(&self, scope_key: &str) -> bool {
        self.labels().contains_key(scope_key)
    }
}
