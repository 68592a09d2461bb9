use super::*;
use serde_json::json;

#[test]
fn test_legacy_list_restricts_exact_names_only() {
    let policy = RestrictedRepos::from_value(Some(&json!(["x"]))).unwrap();

    assert!(policy.is_restricted("x"));
    assert!(!policy.is_restricted("xy"));
    assert!(!policy.is_restricted("other"));
}

#[test]
fn test_include_restricts_everything_not_matching() {
    let policy = RestrictedRepos::from_value(Some(&json!({ "include": ["^a"] }))).unwrap();

    assert!(!policy.is_restricted("alpha"));
    assert!(policy.is_restricted("beta"));
    assert!(policy.is_restricted("ba"));
}

#[test]
fn test_exclude_restricts_only_matching() {
    let policy = RestrictedRepos::from_value(Some(&json!({ "exclude": ["^a"] }))).unwrap();

    assert!(policy.is_restricted("alpha"));
    assert!(!policy.is_restricted("beta"));
}

#[test]
fn test_patterns_are_unanchored() {
    let policy = RestrictedRepos::from_value(Some(&json!({ "exclude": ["test"] }))).unwrap();

    assert!(policy.is_restricted("my-test-repo"));
}

#[test]
fn test_missing_setting_restricts_nothing() {
    let policy = RestrictedRepos::from_value(None).unwrap();

    assert!(!policy.is_restricted("anything"));
}

#[test]
fn test_invalid_pattern_is_rejected() {
    let result = RestrictedRepos::from_value(Some(&json!({ "include": ["(unclosed"] })));

    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidConfiguration { .. })
    ));
}

#[test]
fn test_scalar_setting_is_rejected() {
    let result = RestrictedRepos::from_value(Some(&json!("admin")));

    assert!(result.is_err());
}
