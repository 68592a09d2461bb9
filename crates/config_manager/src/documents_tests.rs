use super::*;
use serde_json::json;

const ORG_SETTINGS: &str = r#"
restrictedRepos:
  exclude: ['^admin$', '^\.github$']
configvalidators:
  - plugin: collaborators
    script: non_empty
    error: Collaborators must not be empty
overridevalidators:
  - plugin: branches
    script: unchanged
    error: Branch protection cannot be overridden
repository:
  has_issues: true
labels:
  - name: bug
    color: CC0000
rulesets:
  - name: org-default
"#;

#[test]
fn test_org_config_lifts_engine_keys_out_of_sections() {
    let config = OrgConfig::from_yaml(".github/settings.yml", ORG_SETTINGS).unwrap();

    assert!(config.section("restrictedRepos").is_none());
    assert!(config.section("configvalidators").is_none());
    assert!(config.section("overridevalidators").is_none());
    assert_eq!(config.sections().len(), 3);
    assert_eq!(config.section("labels").unwrap()[0]["name"], "bug");
    assert!(config.restricted_repos().is_restricted("admin"));
    assert!(!config.restricted_repos().is_restricted("frontend"));
    assert_eq!(config.config_validators()[0].plugin, "collaborators");
    assert_eq!(config.override_validators()[0].script, "unchanged");
}

#[test]
fn test_empty_document_parses_to_empty_mapping() {
    let sections = parse_yaml(".github/repos/empty.yml", "").unwrap();

    assert!(sections.is_empty());
}

#[test]
fn test_non_mapping_root_is_invalid() {
    let result = parse_yaml(".github/settings.yml", "- a\n- b\n");

    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidConfiguration { .. })
    ));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let result = OrgConfig::from_yaml(".github/settings.yml", "labels: [\n");

    assert!(matches!(result, Err(ConfigurationError::ParseError { .. })));
}

#[test]
fn test_suborg_membership_rules_are_split_from_sections() {
    let text = r#"
suborgrepos:
  - frontend
  - 'web-*'
suborgteams:
  - core
suborgproperties:
  - EDP: true
  - tier: gold
labels:
  - name: web
"#;

    let suborg = SubOrgConfig::from_yaml(".github/suborgs/web.yml", text).unwrap();

    assert_eq!(suborg.source(), ".github/suborgs/web.yml");
    assert_eq!(suborg.repos(), &["frontend".to_string(), "web-*".to_string()]);
    assert_eq!(suborg.teams(), &["core".to_string()]);
    assert_eq!(
        suborg.properties(),
        &[
            PropertyQuery {
                name: "EDP".to_string(),
                value: "true".to_string()
            },
            PropertyQuery {
                name: "tier".to_string(),
                value: "gold".to_string()
            },
        ]
    );
    assert!(suborg.section("suborgrepos").is_none());
    assert_eq!(suborg.section("labels"), Some(&json!([{ "name": "web" }])));
}

#[test]
fn test_suborg_repos_must_be_a_list() {
    let result = SubOrgConfig::from_yaml(".github/suborgs/bad.yml", "suborgrepos: frontend\n");

    assert!(result.is_err());
}

#[test]
fn test_repo_override_name_prefers_declared_repository_name() {
    let text = "repository:\n  name: renamed\n  organization: other-org\n";

    let repo = RepoOverride::from_yaml("file-stem", ".github/repos/file-stem.yml", text).unwrap();

    assert_eq!(repo.name(), "file-stem");
    assert_eq!(repo.repository_name(), "renamed");
    assert_eq!(repo.repository_owner(), Some("other-org"));
}

#[test]
fn test_repo_override_name_falls_back_to_file_stem() {
    let repo = RepoOverride::from_yaml("api", ".github/repos/api.yml", "labels: []\n").unwrap();

    assert_eq!(repo.repository_name(), "api");
    assert_eq!(repo.repository_owner(), None);
}
