//! Tests for error types

use super::*;

#[test]
fn test_reconcile_error_message() {
    let err = EngineError::reconcile("labels", "frontend", "section must be a list");

    assert_eq!(
        err.to_string(),
        "Failed to reconcile labels for frontend: section must be a list"
    );
    assert!(!err.is_structural());
}

#[test]
fn test_configuration_errors_convert() {
    let err: EngineError = ConfigurationError::SubOrgConflict {
        repository: "api".to_string(),
        first: "b.yml".to_string(),
        second: "a.yml".to_string(),
    }
    .into();

    assert!(err.is_structural());
    assert_eq!(
        err.to_string(),
        "Configuration error: Multiple suborg configs for api in b.yml and a.yml"
    );
}

#[test]
fn test_github_errors_convert() {
    let err: EngineError = github_client::Error::NotFound.into();

    assert!(matches!(err, EngineError::GitHub(github_client::Error::NotFound)));
    assert!(!err.is_structural());
}
