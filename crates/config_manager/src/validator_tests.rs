use super::*;
use serde_json::json;

fn spec(plugin: &str, script: &str, error: &str) -> ValidatorSpec {
    ValidatorSpec {
        plugin: plugin.to_string(),
        script: script.to_string(),
        error: error.to_string(),
    }
}

#[test]
fn test_unknown_predicate_fails_compilation() {
    let result = ValidatorRegistry::compile(
        &[spec("labels", "return true", "bad")],
        &[],
        &PredicateCatalog::builtin(),
    );

    assert_eq!(
        result.err(),
        Some(ConfigurationError::UnknownPredicate {
            section: "labels".to_string(),
            name: "return true".to_string(),
        })
    );
}

#[test]
fn test_config_validator_rejects_with_configured_message() {
    let registry = ValidatorRegistry::compile(
        &[spec("collaborators", "non_empty", "Collaborators are required")],
        &[],
        &PredicateCatalog::builtin(),
    )
    .unwrap();
    let ctx = ValidationContext::new("org", "repo", "collaborators");

    let result = registry.validate(None, &json!([]), &ctx);

    assert_eq!(
        result,
        Err(ConfigurationError::ValidationRejected {
            section: "collaborators".to_string(),
            message: "Collaborators are required".to_string(),
        })
    );
}

#[test]
fn test_sections_without_validators_pass() {
    let registry = ValidatorRegistry::compile(&[], &[], &PredicateCatalog::builtin()).unwrap();
    let ctx = ValidationContext::new("org", "repo", "labels");

    assert!(registry.is_empty());
    assert!(registry.validate(Some(&json!([])), &json!([{ "name": "x" }]), &ctx).is_ok());
}

#[test]
fn test_list_override_validator_runs_per_named_base_entry() {
    let registry = ValidatorRegistry::compile(
        &[],
        &[spec("branches", "unchanged", "Branch protection cannot change")],
        &PredicateCatalog::builtin(),
    )
    .unwrap();
    let ctx = ValidationContext::new("org", "repo", "branches");
    let base = json!([{ "name": "main", "protection": { "enforce_admins": true } }]);

    // Extra entries do not matter; the matching entry does.
    let same = json!([
        { "name": "develop", "protection": null },
        { "name": "main", "protection": { "enforce_admins": true } }
    ]);
    let changed = json!([{ "name": "main", "protection": { "enforce_admins": false } }]);

    assert!(registry.validate(Some(&base), &same, &ctx).is_ok());
    assert!(registry.validate(Some(&base), &changed, &ctx).is_err());
}

#[test]
fn test_missing_entry_is_validated_as_null() {
    let registry = ValidatorRegistry::compile(
        &[],
        &[spec("labels", "non_empty", "Base labels cannot be removed")],
        &PredicateCatalog::builtin(),
    )
    .unwrap();
    let ctx = ValidationContext::new("org", "repo", "labels");

    let result = registry.validate(
        Some(&json!([{ "name": "bug" }])),
        &json!([{ "name": "feature" }]),
        &ctx,
    );

    assert!(result.is_err());
}

#[test]
fn test_no_removals_and_no_additions() {
    let catalog = PredicateCatalog::builtin();
    let ctx = ValidationContext::new("org", "repo", "topics");
    let base = json!(["a", "b"]);

    let removals = ValidatorRegistry::compile(&[], &[spec("topics", "no_removals", "e")], &catalog)
        .unwrap();
    let additions = ValidatorRegistry::compile(&[], &[spec("topics", "no_additions", "e")], &catalog)
        .unwrap();

    assert!(removals.validate_override(&base, &json!(["a", "b", "c"]), &ctx).is_ok());
    assert!(removals.validate_override(&base, &json!(["a"]), &ctx).is_err());
    assert!(additions.validate_override(&base, &json!(["a"]), &ctx).is_ok());
    assert!(additions.validate_override(&base, &json!(["a", "c"]), &ctx).is_err());
}

#[test]
fn test_custom_predicate_sees_context() {
    let catalog = PredicateCatalog::empty().with_config("only_for_org", |_, ctx| ctx.org == "acme");
    let registry =
        ValidatorRegistry::compile(&[spec("labels", "only_for_org", "wrong org")], &[], &catalog)
            .unwrap();

    let acme = ValidationContext::new("acme", "repo", "labels");
    let other = ValidationContext::new("other", "repo", "labels");

    assert!(registry.validate_config(&json!([]), &acme).is_ok());
    assert!(registry.validate_config(&json!([]), &other).is_err());
}

#[test]
fn test_last_spec_for_a_section_wins() {
    let registry = ValidatorRegistry::compile(
        &[spec("labels", "deny", "first"), spec("labels", "allow", "second")],
        &[],
        &PredicateCatalog::builtin(),
    )
    .unwrap();
    let ctx = ValidationContext::new("org", "repo", "labels");

    assert!(registry.validate_config(&json!([]), &ctx).is_ok());
}
