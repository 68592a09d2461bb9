//! Tests for the resource plugins.

use super::*;
use crate::reconciler::Reconciler;
use github_client::mock::MockSettingsClient;
use serde_json::json;

#[test]
fn test_target_paths_and_names() {
    let repo = Target::repository("acme", "my repo");
    let org = Target::organization("acme");

    assert_eq!(repo.base_path(), "/repos/acme/my%20repo");
    assert_eq!(repo.display_name(), "my repo");
    assert_eq!(repo.to_string(), "acme/my repo");
    assert_eq!(org.base_path(), "/orgs/acme");
    assert_eq!(org.scope(), Scope::Organization);
    assert_eq!(org.owner(), "acme");
}

#[test]
fn test_builtin_registry_lists_collection_plugins() {
    let registry = PluginRegistry::builtin();

    assert_eq!(
        registry.names(),
        vec!["labels", "milestones", "autolinks", "environments", "rulesets"]
    );
    assert!(registry.get("teams").is_none());
    assert!(registry.get("rulesets").map_or(false, |p| p.supports(Scope::Organization)));
    assert!(registry.get("labels").map_or(false, |p| !p.supports(Scope::Organization)));
}

#[test]
fn test_null_section_means_no_entities() {
    let plugin = CollectionPlugin::labels();
    let target = Target::repository("acme", "api");

    assert!(plugin.desired(&target, &Value::Null).unwrap().is_empty());
}

#[test]
fn test_label_colors_are_normalized() {
    let plugin = CollectionPlugin::labels();
    let target = Target::repository("acme", "api");

    let desired = plugin
        .desired(&target, &json!([{ "name": "bug", "color": "#D73A4A" }]))
        .unwrap();

    assert_eq!(desired, vec![json!({ "name": "bug", "color": "d73a4a" })]);
}

#[test]
fn test_scalar_entries_are_rejected() {
    let plugin = CollectionPlugin::labels();
    let target = Target::repository("acme", "api");

    let err = plugin.desired(&target, &json!(["bug"])).unwrap_err();

    assert!(err.to_string().contains("list entries must be mappings"));
}

#[tokio::test]
async fn test_labels_are_patched_by_encoded_name() {
    let client = MockSettingsClient::new().with_resources(
        "/repos/acme/api/labels",
        vec![json!({ "id": 7, "name": "good first issue", "color": "7057FF" })],
    );
    let plugin = CollectionPlugin::labels();
    let target = Target::repository("acme", "api");

    Reconciler::new(&plugin, &client, false)
        .sync(
            &target,
            &json!([{ "name": "good first issue", "color": "ffffff" }]),
        )
        .await
        .unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Patch);
    assert_eq!(calls[0].path, "/repos/acme/api/labels/good%20first%20issue");
    assert_eq!(
        calls[0].body,
        Some(json!({ "name": "good first issue", "color": "ffffff" }))
    );
}

#[tokio::test]
async fn test_autolinks_are_replaced_on_change() {
    let client = MockSettingsClient::new().with_resources(
        "/repos/acme/api/autolinks",
        vec![json!({ "id": 12, "key_prefix": "JIRA-", "url_template": "https://old/<num>" })],
    );
    let plugin = CollectionPlugin::autolinks();
    let target = Target::repository("acme", "api");

    Reconciler::new(&plugin, &client, false)
        .sync(
            &target,
            &json!([{ "key_prefix": "JIRA-", "url_template": "https://new/<num>" }]),
        )
        .await
        .unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].method, HttpMethod::Delete);
    assert_eq!(calls[0].path, "/repos/acme/api/autolinks/12");
    assert_eq!(calls[1].method, HttpMethod::Post);
    assert_eq!(calls[1].path, "/repos/acme/api/autolinks");
}

#[tokio::test]
async fn test_environments_compare_flattened_protection_rules() {
    let client = MockSettingsClient::new().with_resources(
        "/repos/acme/api/environments",
        vec![json!({
            "name": "production",
            "protection_rules": [
                { "type": "wait_timer", "wait_timer": 30 },
                {
                    "type": "required_reviewers",
                    "prevent_self_review": true,
                    "reviewers": [{ "type": "Team", "reviewer": { "id": 99, "slug": "ops" } }]
                }
            ]
        })],
    );
    let plugin = CollectionPlugin::environments();
    let target = Target::repository("acme", "api");

    let actions = Reconciler::new(&plugin, &client, false)
        .sync(
            &target,
            &json!([
                {
                    "name": "production",
                    "wait_timer": 30,
                    "prevent_self_review": true,
                    "reviewers": [{ "type": "Team", "id": 99 }]
                },
                { "name": "staging", "wait_timer": 5 }
            ]),
        )
        .await
        .unwrap();

    assert_eq!(actions[0].action_type, crate::ActionType::Noop);
    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Put);
    assert_eq!(calls[0].path, "/repos/acme/api/environments/staging");
    assert_eq!(calls[0].body, Some(json!({ "wait_timer": 5 })));
}

#[tokio::test]
async fn test_repository_rulesets_ignore_inherited_ones() {
    let client = MockSettingsClient::new()
        .with_resources(
            "/repos/acme/api/rulesets",
            vec![
                json!({ "id": 1, "name": "org-wide", "source_type": "Organization" }),
                json!({ "id": 2, "name": "main", "source_type": "Repository" }),
            ],
        )
        .with_resource(
            "/repos/acme/api/rulesets/2",
            json!({ "id": 2, "name": "main", "enforcement": "evaluate", "source_type": "Repository" }),
        );
    let plugin = CollectionPlugin::rulesets();
    let target = Target::repository("acme", "api");

    Reconciler::new(&plugin, &client, false)
        .sync(&target, &json!([{ "name": "main", "enforcement": "active" }]))
        .await
        .unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Put);
    assert_eq!(calls[0].path, "/repos/acme/api/rulesets/2");
    assert_eq!(
        calls[0].body,
        Some(json!({ "name": "main", "enforcement": "active" }))
    );
}

#[tokio::test]
async fn test_org_rulesets_use_org_endpoints() {
    let client = MockSettingsClient::new();
    let plugin = CollectionPlugin::rulesets();
    let target = Target::organization("acme");

    Reconciler::new(&plugin, &client, false)
        .sync(&target, &json!([{ "name": "baseline", "enforcement": "active" }]))
        .await
        .unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Post);
    assert_eq!(calls[0].path, "/orgs/acme/rulesets");
}
