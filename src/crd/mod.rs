//! Custom Resource Definitions (CRDs) for iam-operator.
//!
//! - `GlobalRole`, `ClusterRole`, `Role`, `WorkspaceRole`: role kinds whose
//!   rules may be aggregated from role templates
//! - `RoleTemplate`: a reusable, labeled set of policy rules

mod aggregation;
mod role_template;
mod roles;

pub use aggregation::*;
pub use role_template::*;
pub use roles::*;

pub use k8s_openapi::api::rbac::v1::PolicyRule;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

/// API group shared by every IAM resource.
pub const IAM_GROUP: &str = "iam.kubesphere.io";

/// API version shared by every IAM resource.
pub const IAM_VERSION: &str = "v1beta1";
