//! Controller module for iam-operator.
//!
//! Contains the aggregation engine, the reconcile loops, error handling and
//! the cluster client seam.
//!
//! Two kinds of controller share these modules:
//! - role controllers (`role_reconciler`), one per role kind, pulling rules
//!   from the templates a role references
//! - the RoleTemplate controller (`role_template_reconciler`), pushing a new
//!   template into auto-aggregate GlobalRoles

// Shared modules
pub mod client;
pub mod context;
pub mod error;
pub mod retry;
pub mod rule_owner;

// Aggregation engine
pub mod aggregation;
pub mod covers;

// Controllers
pub mod role_reconciler;
pub mod role_template_reconciler;
