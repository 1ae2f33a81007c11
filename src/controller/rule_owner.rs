//! Uniform view over the role kinds that aggregate role templates.
//!
//! `RuleOwner` wraps a freshly fetched role object so aggregation and
//! reconcile logic are written once for all four kinds. Mutations go to
//! the wrapped object, which is then written back with a single update.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;

use crate::crd::{
    AggregationRoleTemplates, ClusterRole, GlobalRole, Role, SCOPE_CLUSTER, SCOPE_GLOBAL,
    SCOPE_NAMESPACE, SCOPE_WORKSPACE, WorkspaceRole,
};

/// The role kinds that can own aggregated rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OwnerKind {
    GlobalRole,
    ClusterRole,
    Role,
    WorkspaceRole,
}

impl OwnerKind {
    /// Every owner kind.
    pub const ALL: [OwnerKind; 4] = [
        OwnerKind::GlobalRole,
        OwnerKind::ClusterRole,
        OwnerKind::Role,
        OwnerKind::WorkspaceRole,
    ];

    /// Label key a RoleTemplate must carry to be aggregated into this kind.
    pub fn scope_key(self) -> &'static str {
        match self {
            OwnerKind::GlobalRole => SCOPE_GLOBAL,
            OwnerKind::ClusterRole => SCOPE_CLUSTER,
            OwnerKind::Role => SCOPE_NAMESPACE,
            OwnerKind::WorkspaceRole => SCOPE_WORKSPACE,
        }
    }

    /// Kubernetes kind name.
    pub fn as_str(self) -> &'static str {
        match self {
            OwnerKind::GlobalRole => "GlobalRole",
            OwnerKind::ClusterRole => "ClusterRole",
            OwnerKind::Role => "Role",
            OwnerKind::WorkspaceRole => "WorkspaceRole",
        }
    }

    /// Whether objects of this kind live in a namespace.
    pub fn is_namespaced(self) -> bool {
        matches!(self, OwnerKind::Role)
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role object of any owner kind.
#[derive(Clone, Debug)]
pub enum RuleOwner {
    GlobalRole(GlobalRole),
    ClusterRole(ClusterRole),
    Role(Role),
    WorkspaceRole(WorkspaceRole),
}

/// Evaluate `$body` with `$role` bound to the wrapped object.
macro_rules! with_role {
    ($owner:expr, $role:ident => $body:expr) => {
        match $owner {
            RuleOwner::GlobalRole($role) => $body,
            RuleOwner::ClusterRole($role) => $body,
            RuleOwner::Role($role) => $body,
            RuleOwner::WorkspaceRole($role) => $body,
        }
    };
}

impl RuleOwner {
    pub fn kind(&self) -> OwnerKind {
        match self {
            RuleOwner::GlobalRole(_) => OwnerKind::GlobalRole,
            RuleOwner::ClusterRole(_) => OwnerKind::ClusterRole,
            RuleOwner::Role(_) => OwnerKind::Role,
            RuleOwner::WorkspaceRole(_) => OwnerKind::WorkspaceRole,
        }
    }

    pub fn scope_key(&self) -> &'static str {
        self.kind().scope_key()
    }

    pub fn name(&self) -> String {
        with_role!(self, r => r.name_any())
    }

    /// Namespace of the object; `None` for cluster-scoped kinds.
    pub fn namespace(&self) -> Option<String> {
        with_role!(self, r => r.namespace())
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        with_role!(self, r => r.labels())
    }

    pub fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        with_role!(self, r => r.labels_mut())
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        with_role!(self, r => r.annotations())
    }

    pub fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        with_role!(self, r => r.annotations_mut())
    }

    pub fn rules(&self) -> &[PolicyRule] {
        with_role!(self, r => &r.spec.rules)
    }

    pub fn set_rules(&mut self, rules: Vec<PolicyRule>) {
        with_role!(self, r => r.spec.rules = rules)
    }

    pub fn aggregation_rule(&self) -> Option<&AggregationRoleTemplates> {
        with_role!(self, r => r.spec.aggregation_role_templates.as_ref())
    }

    pub fn set_aggregation_rule(&mut self, aggregation: Option<AggregationRoleTemplates>) {
        with_role!(self, r => r.spec.aggregation_role_templates = aggregation)
    }

    pub fn resource_version(&self) -> Option<String> {
        with_role!(self, r => r.resource_version())
    }

    /// Reference used to attach events to the wrapped object.
    pub fn object_ref(&self) -> ObjectReference {
        with_role!(self, r => r.object_ref(&()))
    }
}

impl From<GlobalRole> for RuleOwner {
    fn from(role: GlobalRole) -> Self {
        RuleOwner::GlobalRole(role)
    }
}

impl From<ClusterRole> for RuleOwner {
    fn from(role: ClusterRole) -> Self {
        RuleOwner::ClusterRole(role)
    }
}

impl From<Role> for RuleOwner {
    fn from(role: Role) -> Self {
        RuleOwner::Role(role)
    }
}

impl From<WorkspaceRole> for RuleOwner {
    fn from(role: WorkspaceRole) -> Self {
        RuleOwner::WorkspaceRole(role)
    }
}

/// Binds a role CRD type to its owner kind so one generic controller
/// serves every kind.
pub trait AggregatingRole:
    Resource<DynamicType = ()>
    + Clone
    + DeserializeOwned
    + fmt::Debug
    + Send
    + Sync
    + Into<RuleOwner>
    + 'static
{
    const KIND: OwnerKind;

    fn aggregation(&self) -> Option<&AggregationRoleTemplates>;

    /// Whether this role names `template` in its resolved template list.
    fn references_template(&self, template: &str) -> bool {
        self.aggregation()
            .is_some_and(|a| a.template_names.iter().any(|n| n == template))
    }
}

impl AggregatingRole for GlobalRole {
    const KIND: OwnerKind = OwnerKind::GlobalRole;

    fn aggregation(&self) -> Option<&AggregationRoleTemplates> {
        self.spec.aggregation_role_templates.as_ref()
    }
}

impl AggregatingRole for ClusterRole {
    const KIND: OwnerKind = OwnerKind::ClusterRole;

    fn aggregation(&self) -> Option<&AggregationRoleTemplates> {
        self.spec.aggregation_role_templates.as_ref()
    }
}

impl AggregatingRole for Role {
    const KIND: OwnerKind = OwnerKind::Role;

    fn aggregation(&self) -> Option<&AggregationRoleTemplates> {
        self.spec.aggregation_role_templates.as_ref()
    }
}

impl AggregatingRole for WorkspaceRole {
    const KIND: OwnerKind = OwnerKind::WorkspaceRole;

    fn aggregation(&self) -> Option<&AggregationRoleTemplates> {
        self.spec.aggregation_role_templates.as_ref()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::crd::{GlobalRoleSpec, RoleSpec};

    fn pods_rule(verb: &str) -> PolicyRule {
        PolicyRule {
            verbs: vec![verb.to_string()],
            resources: Some(vec!["pods".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_scope_keys_are_distinct() {
        let mut keys: Vec<_> = OwnerKind::ALL.iter().map(|k| k.scope_key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 4);
        assert_eq!(OwnerKind::GlobalRole.scope_key(), SCOPE_GLOBAL);
        assert_eq!(OwnerKind::Role.scope_key(), SCOPE_NAMESPACE);
    }

    #[test]
    fn test_only_role_is_namespaced() {
        for kind in OwnerKind::ALL {
            assert_eq!(kind.is_namespaced(), kind == OwnerKind::Role);
        }
    }

    #[test]
    fn test_accessors_mutate_wrapped_object() {
        let mut owner = RuleOwner::from(GlobalRole::new("admin", GlobalRoleSpec::default()));
        owner.set_rules(vec![pods_rule("get")]);
        owner.set_aggregation_rule(Some(AggregationRoleTemplates::from_names(["t1"])));
        owner
            .labels_mut()
            .insert("tier".to_string(), "x".to_string());

        let RuleOwner::GlobalRole(role) = &owner else {
            panic!("variant changed");
        };
        assert_eq!(role.spec.rules, vec![pods_rule("get")]);
        assert_eq!(
            role.spec.aggregation_role_templates,
            Some(AggregationRoleTemplates::from_names(["t1"]))
        );
        assert_eq!(owner.labels().get("tier").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = RuleOwner::from(GlobalRole::new("admin", GlobalRoleSpec::default()));
        let mut copy = original.clone();
        copy.set_rules(vec![pods_rule("list")]);
        assert!(original.rules().is_empty());
        assert_eq!(copy.rules().len(), 1);
    }

    #[test]
    fn test_namespaced_owner() {
        let mut role = Role::new("dev", RoleSpec::default());
        role.metadata.namespace = Some("team-a".to_string());
        let owner = RuleOwner::from(role);
        assert_eq!(owner.kind(), OwnerKind::Role);
        assert_eq!(owner.namespace().as_deref(), Some("team-a"));
        assert_eq!(owner.object_ref().kind.as_deref(), Some("Role"));
    }

    #[test]
    fn test_references_template() {
        let mut role = GlobalRole::new("admin", GlobalRoleSpec::default());
        assert!(!role.references_template("t1"));
        role.spec.aggregation_role_templates =
            Some(AggregationRoleTemplates::from_names(["t1", "t2"]));
        assert!(role.references_template("t2"));
        assert!(!role.references_template("t3"));
    }
}
