use super::*;
use serde_json::json;

#[test]
fn test_action_type_serializes_uppercase() {
    assert_eq!(serde_json::to_value(ActionType::Noop).unwrap(), json!("NOOP"));
    assert_eq!(ActionType::Error.to_string(), "ERROR");
}

#[test]
fn test_create_action_reports_additions() {
    let action = ReconcileAction::create("labels", "api", json!({ "name": "bug" }));

    assert_eq!(action.action_type, ActionType::Create);
    assert_eq!(action.detail.additions, Some(json!({ "name": "bug" })));
    assert_eq!(
        action.detail.counts(),
        ChangeCounts {
            additions: 1,
            deletions: 0,
            modifications: 0
        }
    );
}

#[test]
fn test_noop_and_error_have_no_changes() {
    let noop = ReconcileAction::noop("labels", "api", json!({ "name": "bug" }));
    let error = ReconcileAction::error("labels", "api", "boom");

    assert!(!noop.detail.has_changes());
    assert!(!error.detail.has_changes());
    assert_eq!(error.detail.msg, "boom");
}

#[test]
fn test_sync_result_from_action() {
    let result: SyncResult =
        ReconcileAction::update("milestones", "api", json!({ "title": "v1", "state": "closed" }))
            .into();

    assert_eq!(result.dedup_key(), (ActionType::Update, "api", "milestones"));
    assert!(!result.is_error());
    assert!(result.action.has_changes());
}

#[test]
fn test_counts_use_list_length() {
    let detail = ActionDetail {
        msg: String::new(),
        additions: None,
        deletions: Some(json!([{ "name": "a" }, { "name": "b" }])),
        modifications: None,
    };

    assert_eq!(detail.counts().deletions, 2);
}
