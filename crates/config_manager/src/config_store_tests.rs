use super::*;
use crate::SubOrgResolver;
use github_client::mock::MockSettingsClient;

fn store(client: MockSettingsClient) -> GitHubConfigStore {
    GitHubConfigStore::new(Arc::new(client), EngineSettings::default())
}

fn admin_layout() -> MockSettingsClient {
    MockSettingsClient::new()
        .with_file(".github/settings.yml", "labels:\n  - name: bug\n")
        .with_directory(
            ".github",
            &[("settings.yml", "s1", false), ("suborgs", "s2", true), ("repos", "tree-sha", true)],
        )
        .with_directory(
            ".github/suborgs",
            &[("web.yml", "w1", false), ("empty.yml", "e1", false), ("nested", "n1", true)],
        )
        .with_file(".github/suborgs/web.yml", "suborgrepos: [frontend]\n")
        .with_file(".github/suborgs/empty.yml", "")
        .with_tree("tree-sha", &["frontend.yml", "api.yml"], false)
        .with_file(".github/repos/frontend.yml", "repository:\n  has_wiki: false\n")
        .with_file(".github/repos/api.yml", "labels: []\n")
}

#[test]
fn test_engine_settings_paths_follow_config_path() {
    let settings = EngineSettings {
        config_path: "config/".to_string(),
        ..EngineSettings::default()
    };

    assert_eq!(settings.settings_path(), "config/settings.yml");
    assert_eq!(settings.suborgs_path(), "config/suborgs");
}

#[test]
fn test_engine_settings_deserialize_with_defaults() {
    let settings: EngineSettings =
        serde_json::from_value(serde_json::json!({ "admin_repo": "org-admin" })).unwrap();

    assert_eq!(settings.admin_repo, "org-admin");
    assert_eq!(settings.settings_file, "settings.yml");
    assert!(!settings.create_pr_comment);
}

#[tokio::test]
async fn test_load_org_config() {
    let store = store(admin_layout());

    let config = store.load_org_config("org", None).await.unwrap();

    assert_eq!(config.section("labels").unwrap()[0]["name"], "bug");
}

#[tokio::test]
async fn test_missing_org_config_is_empty() {
    let store = store(MockSettingsClient::new());

    let config = store.load_org_config("org", Some("main")).await.unwrap();

    assert!(config.sections().is_empty());
}

#[tokio::test]
async fn test_org_config_fetch_failure_is_an_error() {
    let store = store(MockSettingsClient::new().failing(".github/settings.yml"));

    let result = store.load_org_config("org", None).await;

    assert!(matches!(
        result,
        Err(ConfigurationError::FileAccessError { .. })
    ));
}

#[tokio::test]
async fn test_load_suborgs_skips_empty_documents_and_directories() {
    let store = store(admin_layout());

    let suborgs = store.load_suborg_configs("org", None).await.unwrap();

    assert_eq!(suborgs.len(), 1);
    assert_eq!(suborgs[0].source(), ".github/suborgs/web.yml");
}

#[tokio::test]
async fn test_load_all_repo_overrides() {
    let store = store(admin_layout());

    let overrides = store
        .load_repo_overrides("org", None, OverrideFilter::All)
        .await
        .unwrap();

    let names: Vec<&str> = overrides.iter().map(|o| o.name()).collect();
    assert_eq!(names, vec!["frontend", "api"]);
    assert_eq!(overrides[0].source(), ".github/repos/frontend.yml");
}

#[tokio::test]
async fn test_single_repo_filter_loads_one_override() {
    let store = store(admin_layout());

    let overrides = store
        .load_repo_overrides("org", None, OverrideFilter::Repository("api"))
        .await
        .unwrap();

    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].name(), "api");
}

#[tokio::test]
async fn test_single_repo_filter_accepts_yaml_extension() {
    let client = admin_layout()
        .with_tree("tree-sha", &["frontend.yml", "api.yaml"], false)
        .with_file(".github/repos/api.yaml", "labels: []\n");
    let store = store(client);

    let overrides = store
        .load_repo_overrides("org", None, OverrideFilter::Repository("api"))
        .await
        .unwrap();

    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].source(), ".github/repos/api.yaml");
}

#[tokio::test]
async fn test_single_repo_filter_ignores_other_extensions() {
    let client = admin_layout().with_tree("tree-sha", &["api.json", "api"], false);
    let store = store(client);

    let overrides = store
        .load_repo_overrides("org", None, OverrideFilter::Repository("api"))
        .await
        .unwrap();

    assert!(overrides.is_empty());
}

#[tokio::test]
async fn test_suborg_filter_loads_governed_overrides() {
    let client = admin_layout();
    let suborgs = vec![SubOrgConfig::from_yaml(".github/suborgs/web.yml", "suborgrepos: [frontend]\n").unwrap()];
    let map = SubOrgResolver::new(&client, "org")
        .resolve(&suborgs, None)
        .await
        .unwrap();
    let store = store(client);

    let overrides = store
        .load_repo_overrides("org", None, OverrideFilter::SubOrg(&map))
        .await
        .unwrap();

    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].name(), "frontend");
}

#[tokio::test]
async fn test_truncated_repos_tree_is_an_error() {
    let client = MockSettingsClient::new()
        .with_directory(".github", &[("repos", "big", true)])
        .with_tree("big", &["a.yml"], true);
    let store = store(client);

    let result = store
        .load_repo_overrides("org", None, OverrideFilter::All)
        .await;

    assert_eq!(
        result.err(),
        Some(ConfigurationError::TruncatedTree {
            path: ".github/repos".to_string()
        })
    );
}

#[tokio::test]
async fn test_missing_repos_directory_yields_no_overrides() {
    let client = MockSettingsClient::new().with_directory(".github", &[("settings.yml", "s", false)]);
    let store = store(client);

    let overrides = store
        .load_repo_overrides("org", None, OverrideFilter::All)
        .await
        .unwrap();

    assert!(overrides.is_empty());
}
