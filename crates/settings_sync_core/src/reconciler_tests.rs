//! Tests for the generic reconciler.

use super::*;
use crate::{plugins::CollectionPlugin, ActionType, EngineError};
use github_client::{mock::MockSettingsClient, HttpMethod};
use serde_json::json;

const MILESTONES: &str = "/repos/acme/api/milestones?state=all";

fn live_milestones() -> Vec<Value> {
    vec![
        json!({ "title": "no-change", "description": "no-change-description", "due_on": null, "state": "open", "number": 5 }),
        json!({ "title": "new-description", "description": "old-description", "due_on": null, "state": "open", "number": 2 }),
        json!({ "title": "new-state", "description": "FF0000", "due_on": null, "state": "open", "number": 4 }),
        json!({ "title": "remove-milestone", "description": "old-description", "due_on": null, "state": "open", "number": 1 }),
    ]
}

fn desired_milestones() -> Value {
    json!([
        { "title": "no-change", "description": "no-change-description", "due_on": "2019-03-29T07:00:00Z", "state": "open" },
        { "title": "new-description", "description": "modified-description" },
        { "title": "new-state", "state": "closed" },
        { "title": "added" },
    ])
}

#[test]
fn test_diff_only_compares_declared_fields() {
    let schema = EntitySchema::keyed("name");
    let desired = vec![json!({ "name": "bug", "color": "d73a4a" })];
    let current = vec![json!({ "name": "bug", "color": "d73a4a", "description": "live only" })];

    let changes = diff(&schema, &desired, &current);

    assert_eq!(changes.len(), 1);
    assert!(matches!(changes[0], Change::Noop { .. }));
}

#[test]
fn test_diff_treats_live_null_as_absent() {
    let schema = EntitySchema::keyed("name");
    let desired = vec![json!({ "name": "bug", "description": null })];

    let missing = diff(&schema, &desired, &[json!({ "name": "bug" })]);
    let null = diff(&schema, &desired, &[json!({ "name": "bug", "description": null })]);

    assert!(matches!(missing[0], Change::Noop { .. }));
    assert!(matches!(null[0], Change::Noop { .. }));
}

#[test]
fn test_diff_desired_null_against_live_value_is_a_change() {
    let schema = EntitySchema::keyed("name");
    let desired = vec![json!({ "name": "bug", "description": null })];
    let current = vec![json!({ "name": "bug", "description": "set" })];

    let changes = diff(&schema, &desired, &current);

    match &changes[0] {
        Change::Update { payload, .. } => {
            assert_eq!(payload, &json!({ "name": "bug", "description": null }))
        }
        other => panic!("expected an update, got {other:?}"),
    }
}

#[test]
fn test_diff_compares_nested_mappings_partially() {
    let schema = EntitySchema::keyed("name");
    let desired = vec![json!({ "name": "prod", "deployment_branch_policy": { "protected_branches": true } })];
    let current = vec![json!({
        "name": "prod",
        "deployment_branch_policy": { "protected_branches": true, "custom_branch_policies": false }
    })];

    assert!(matches!(diff(&schema, &desired, &current)[0], Change::Noop { .. }));
}

#[test]
fn test_diff_first_live_match_wins() {
    let schema = EntitySchema::keyed("name").with_id("id");
    let desired = vec![json!({ "name": "dup" })];
    let current = vec![json!({ "id": 1, "name": "dup" }), json!({ "id": 2, "name": "dup" })];

    let changes = diff(&schema, &desired, &current);

    assert!(matches!(changes[0], Change::Noop { .. }));
    assert_eq!(changes[1], Change::Delete { current: json!({ "id": 2, "name": "dup" }) });
}

#[test]
fn test_diff_is_idempotent_once_live_matches_desired() {
    let schema = EntitySchema::keyed("name");
    let desired = vec![json!({ "name": "a", "color": "ffffff" }), json!({ "name": "b" })];

    let changes = diff(&schema, &desired, &desired);

    assert!(changes.iter().all(|c| !c.is_mutation()));
}

#[tokio::test]
async fn test_milestones_reconcile_sends_minimal_changes() {
    let client = MockSettingsClient::new().with_resources(MILESTONES, live_milestones());
    let plugin = CollectionPlugin::milestones();
    let target = Target::repository("acme", "api");

    let actions = Reconciler::new(&plugin, &client, false)
        .sync(&target, &desired_milestones())
        .await
        .unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0].method, HttpMethod::Patch);
    assert_eq!(calls[0].path, "/repos/acme/api/milestones/2");
    assert_eq!(
        calls[0].body,
        Some(json!({ "title": "new-description", "description": "modified-description" }))
    );
    assert_eq!(calls[1].path, "/repos/acme/api/milestones/4");
    assert_eq!(calls[1].body, Some(json!({ "title": "new-state", "state": "closed" })));
    assert_eq!(calls[2].method, HttpMethod::Post);
    assert_eq!(calls[2].path, "/repos/acme/api/milestones");
    assert_eq!(calls[2].body, Some(json!({ "title": "added" })));
    assert_eq!(calls[3].method, HttpMethod::Delete);
    assert_eq!(calls[3].path, "/repos/acme/api/milestones/1");

    let kinds: Vec<ActionType> = actions.iter().map(|a| a.action_type).collect();
    assert_eq!(
        kinds,
        vec![
            ActionType::Noop,
            ActionType::Update,
            ActionType::Update,
            ActionType::Create,
            ActionType::Delete,
        ]
    );
    assert_eq!(
        actions[1].payload,
        json!({ "title": "new-description", "description": "modified-description", "number": 2 })
    );
    assert_eq!(
        actions[2].payload,
        json!({ "title": "new-state", "state": "closed", "number": 4 })
    );
    assert_eq!(actions[3].payload, json!({ "title": "added" }));
    assert_eq!(actions[4].payload, json!({ "title": "remove-milestone", "number": 1 }));
}

#[tokio::test]
async fn test_dry_run_reports_without_mutating() {
    let client = MockSettingsClient::new().with_resources(MILESTONES, live_milestones());
    let plugin = CollectionPlugin::milestones();
    let target = Target::repository("acme", "api");

    let actions = Reconciler::new(&plugin, &client, true)
        .sync(&target, &desired_milestones())
        .await
        .unwrap();

    assert!(client.calls().is_empty());
    assert_eq!(actions.len(), 5);
    assert_eq!(actions[0].repo, "api");
    assert_eq!(actions[0].plugin, "milestones");
}

#[tokio::test]
async fn test_rejected_mutation_fails_the_section() {
    let client = MockSettingsClient::new()
        .with_resources(MILESTONES, live_milestones())
        .failing("/repos/acme/api/milestones");
    let plugin = CollectionPlugin::milestones();
    let target = Target::repository("acme", "api");

    let result = Reconciler::new(&plugin, &client, false)
        .sync(&target, &desired_milestones())
        .await;

    assert!(matches!(result, Err(EngineError::GitHub(_))));
}

#[tokio::test]
async fn test_wrong_section_shape_is_a_reconcile_error() {
    let client = MockSettingsClient::new();
    let plugin = CollectionPlugin::milestones();
    let target = Target::repository("acme", "api");

    let err = Reconciler::new(&plugin, &client, false)
        .sync(&target, &json!({ "title": "not a list" }))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Failed to reconcile milestones for api: section must be a list"
    );
}
