//! A new global template is pushed into auto-aggregate GlobalRoles.

use iam_operator::controller::role_reconciler::{REASON_AGGREGATE_FAILED, REASON_SYNCED};
use iam_operator::controller::role_template_reconciler::aggregate_into_global_roles;
use iam_operator::controller::rule_owner::OwnerKind;
use iam_operator::crd::{AggregationRoleTemplates, SCOPE_CLUSTER, SCOPE_GLOBAL};

use crate::fixtures::*;

#[tokio::test]
async fn test_new_template_is_pushed_into_matching_global_role() {
    let (fake, ctx) = setup();
    fake.insert_owner(auto_aggregate(global_role(
        "platform-viewer",
        vec![rule("get", "pods")],
        AggregationRoleTemplates {
            template_names: vec!["base".to_string()],
            ..selectors(vec![selector(&[("tier", "x")])])
        },
    )));
    let new = template(
        "new-viewer",
        &[SCOPE_GLOBAL],
        &[("tier", "x")],
        vec![rule("get", "pods"), rule("list", "pods")],
    );

    let updated = aggregate_into_global_roles(&new, &ctx).await.unwrap();

    assert_eq!(updated, 1);
    assert_eq!(fake.update_count(), 1);
    let stored = fake.owner(OwnerKind::GlobalRole, None, "platform-viewer");
    assert_eq!(stored.rules(), &[rule("get", "pods"), rule("list", "pods")]);
    assert_eq!(
        stored.aggregation_rule().unwrap().template_names,
        vec!["base".to_string(), "new-viewer".to_string()]
    );

    let events = fake.normal_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].object, "platform-viewer");
    assert_eq!(events[0].reason, REASON_SYNCED);
}

#[tokio::test]
async fn test_push_is_idempotent() {
    let (fake, ctx) = setup();
    fake.insert_owner(auto_aggregate(global_role(
        "platform-viewer",
        vec![],
        selectors(vec![selector(&[("tier", "x")])]),
    )));
    let new = template(
        "new-viewer",
        &[SCOPE_GLOBAL],
        &[("tier", "x")],
        vec![rule("get", "pods")],
    );

    assert_eq!(aggregate_into_global_roles(&new, &ctx).await.unwrap(), 1);
    assert_eq!(aggregate_into_global_roles(&new, &ctx).await.unwrap(), 0);
    assert_eq!(fake.update_count(), 1);
}

#[tokio::test]
async fn test_template_without_global_scope_is_ignored() {
    let (fake, ctx) = setup();
    fake.insert_owner(auto_aggregate(global_role(
        "platform-viewer",
        vec![],
        selectors(vec![selector(&[("tier", "x")])]),
    )));
    let new = template(
        "cluster-viewer",
        &[SCOPE_CLUSTER],
        &[("tier", "x")],
        vec![rule("get", "pods")],
    );

    assert_eq!(aggregate_into_global_roles(&new, &ctx).await.unwrap(), 0);
    assert_eq!(fake.update_count(), 0);
    assert!(fake.events().is_empty());
}

#[tokio::test]
async fn test_roles_without_annotation_are_not_touched() {
    let (fake, ctx) = setup();
    fake.insert_owner(global_role(
        "manual",
        vec![],
        selectors(vec![selector(&[("tier", "x")])]),
    ));
    let new = template(
        "new-viewer",
        &[SCOPE_GLOBAL],
        &[("tier", "x")],
        vec![rule("get", "pods")],
    );

    assert_eq!(aggregate_into_global_roles(&new, &ctx).await.unwrap(), 0);
    assert!(
        fake.owner(OwnerKind::GlobalRole, None, "manual")
            .rules()
            .is_empty()
    );
}

#[tokio::test]
async fn test_only_matching_roles_are_updated() {
    let (fake, ctx) = setup();
    fake.insert_owner(auto_aggregate(global_role(
        "tier-x",
        vec![],
        selectors(vec![selector(&[("tier", "x")])]),
    )));
    fake.insert_owner(auto_aggregate(global_role(
        "tier-y",
        vec![],
        selectors(vec![selector(&[("tier", "y")])]),
    )));
    fake.insert_owner(auto_aggregate(global_role(
        "everything",
        vec![],
        selectors(vec![Default::default()]),
    )));
    let new = template(
        "new-viewer",
        &[SCOPE_GLOBAL],
        &[("tier", "x")],
        vec![rule("get", "pods")],
    );

    assert_eq!(aggregate_into_global_roles(&new, &ctx).await.unwrap(), 2);
    assert_eq!(
        fake.owner(OwnerKind::GlobalRole, None, "tier-x").rules(),
        &[rule("get", "pods")]
    );
    assert_eq!(
        fake.owner(OwnerKind::GlobalRole, None, "everything").rules(),
        &[rule("get", "pods")]
    );
    assert!(
        fake.owner(OwnerKind::GlobalRole, None, "tier-y")
            .rules()
            .is_empty()
    );
}

#[tokio::test]
async fn test_update_failure_stops_the_pass() {
    let (fake, ctx) = setup();
    fake.insert_owner(auto_aggregate(global_role(
        "a",
        vec![],
        selectors(vec![selector(&[("tier", "x")])]),
    )));
    fake.insert_owner(auto_aggregate(global_role(
        "b",
        vec![],
        selectors(vec![selector(&[("tier", "x")])]),
    )));
    fake.fail_updates_with(500);
    let new = template(
        "new-viewer",
        &[SCOPE_GLOBAL],
        &[("tier", "x")],
        vec![rule("get", "pods")],
    );

    assert!(aggregate_into_global_roles(&new, &ctx).await.is_err());
    let warnings = fake.warning_events();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].reason, REASON_AGGREGATE_FAILED);

    fake.clear_failures();
    assert_eq!(aggregate_into_global_roles(&new, &ctx).await.unwrap(), 2);
}
