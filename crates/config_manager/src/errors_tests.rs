use super::*;

#[test]
fn test_suborg_conflict_message_names_both_documents() {
    let error = ConfigurationError::SubOrgConflict {
        repository: "frontend".to_string(),
        first: ".github/suborgs/web.yml".to_string(),
        second: ".github/suborgs/ui.yml".to_string(),
    };

    assert_eq!(
        error.to_string(),
        "Multiple suborg configs for frontend in .github/suborgs/web.yml and .github/suborgs/ui.yml"
    );
    assert!(error.is_structural());
}

#[test]
fn test_validation_rejected_message_uses_configured_error() {
    let error = ConfigurationError::ValidationRejected {
        section: "branches".to_string(),
        message: "Branch protection required_approving_review_count cannot be overidden to a lower value".to_string(),
    };

    assert!(error
        .to_string()
        .starts_with("Validation failed for branches: Branch protection"));
    assert!(!error.is_structural());
}

#[test]
fn test_parse_error_includes_path() {
    let error = ConfigurationError::ParseError {
        path: ".github/settings.yml".to_string(),
        reason: "mapping values are not allowed here".to_string(),
    };

    assert!(error.to_string().contains(".github/settings.yml"));
}
