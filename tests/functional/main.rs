// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for role template aggregation.
//!
//! These tests drive the real reconcile functions against an in-memory
//! cluster (`FakeClient`) WITHOUT requiring a live Kubernetes cluster.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_named_templates_skip_missing
//! ```
//!
//! ## Test Categories
//!
//! - **Pull tests**: a role resolves the templates it references
//! - **Push tests**: a new global template lands in auto-aggregate GlobalRoles
//! - **Convergence tests**: push and pull acting on the same GlobalRole
//! - **Controller tests**: reconcile/error_policy wrappers and retry budget

mod fake_client;
mod push_tests;
