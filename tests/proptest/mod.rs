// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for iam-operator.
//!
//! Uses proptest to generate random rule sets and label maps and verify the
//! aggregation invariants.

use std::collections::BTreeMap;

use proptest::prelude::*;

use iam_operator::controller::aggregation::merge_rules;
use iam_operator::controller::covers::covers;
use iam_operator::controller::role_template_reconciler::match_labels_subset;
use iam_operator::crd::{LabelSelector, PolicyRule};

/// Strategy for small policy rules drawn from a narrow vocabulary so that
/// duplicates are common.
fn any_rule() -> impl Strategy<Value = PolicyRule> {
    (
        prop::sample::select(vec!["get", "list", "watch", "delete"]),
        prop::sample::select(vec!["pods", "secrets", "nodes"]),
        prop::option::of(prop::sample::select(vec!["", "apps"])),
    )
        .prop_map(|(verb, resource, group)| PolicyRule {
            api_groups: group.map(|g| vec![g.to_string()]),
            verbs: vec![verb.to_string()],
            resources: Some(vec![resource.to_string()]),
            ..Default::default()
        })
}

fn any_rules() -> impl Strategy<Value = Vec<PolicyRule>> {
    prop::collection::vec(any_rule(), 0..12)
}

fn any_labels() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop::sample::select(vec!["tier", "team", "zone"]).prop_map(String::from),
        prop::sample::select(vec!["x", "y", ""]).prop_map(String::from),
        0..3,
    )
}

proptest! {
    #[test]
    fn merged_rules_have_no_duplicates(rules in any_rules()) {
        let mut merged = Vec::new();
        merge_rules(&mut merged, rules.clone());
        for (i, rule) in merged.iter().enumerate() {
            prop_assert!(!merged[i + 1..].contains(rule));
        }
        // Every input rule survives.
        for rule in &rules {
            prop_assert!(merged.contains(rule));
        }
    }

    #[test]
    fn merge_preserves_first_occurrence_order(rules in any_rules()) {
        let mut merged = Vec::new();
        merge_rules(&mut merged, rules.clone());
        let mut expected: Vec<PolicyRule> = Vec::new();
        for rule in rules {
            if !expected.contains(&rule) {
                expected.push(rule);
            }
        }
        prop_assert_eq!(merged, expected);
    }

    #[test]
    fn merge_is_idempotent(rules in any_rules(), extra in any_rules()) {
        let mut once = Vec::new();
        merge_rules(&mut once, rules.clone());
        merge_rules(&mut once, extra.clone());

        let mut twice = once.clone();
        let added = merge_rules(&mut twice, rules.into_iter().chain(extra));
        prop_assert_eq!(added, 0);
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn rules_cover_themselves(rules in any_rules()) {
        let (covered, missing) = covers(&rules, &rules);
        prop_assert!(covered);
        prop_assert!(missing.is_empty());
    }

    #[test]
    fn merge_result_covers_both_inputs(left in any_rules(), right in any_rules()) {
        let mut merged = left.clone();
        merge_rules(&mut merged, right.clone());
        prop_assert!(covers(&merged, &left).0);
        prop_assert!(covers(&merged, &right).0);
    }

    #[test]
    fn missing_rules_are_exactly_the_uncovered_ones(current in any_rules(), proposed in any_rules()) {
        let (covered, missing) = covers(&current, &proposed);
        prop_assert_eq!(covered, missing.is_empty());
        for rule in &missing {
            prop_assert!(!current.contains(rule));
        }
        for rule in &proposed {
            prop_assert!(current.contains(rule) || missing.contains(rule));
        }
    }

    #[test]
    fn labels_always_match_their_own_subset(labels in any_labels(), keep in 0usize..4) {
        let subset: BTreeMap<String, String> = labels
            .iter()
            .take(keep)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let selector = LabelSelector {
            match_labels: Some(subset),
            match_expressions: None,
        };
        prop_assert!(match_labels_subset(&selector, &labels));
    }
}
