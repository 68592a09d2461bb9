//! Unit tests for the github_client crate.

use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> GitHubClient {
    let octocrab = octocrab::Octocrab::builder()
        .base_uri(server.uri())
        .unwrap()
        .personal_token("test-token".to_string())
        .build()
        .unwrap();
    GitHubClient::new(octocrab)
}

#[tokio::test]
async fn test_get_content_decodes_file() {
    let mock_server = MockServer::start().await;
    // "labels: []\n" split across lines the way the contents API returns it
    Mock::given(method("GET"))
        .and(path("/repos/test-org/admin/contents/.github/settings.yml"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "file",
            "encoding": "base64",
            "content": "bGFiZWxz\nOiBbXQo=\n"
        })))
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    let content = client
        .get_content("test-org", "admin", ".github/settings.yml", Some("main"))
        .await
        .expect("content request failed");

    assert_eq!(content, Some(FileContent::File("labels: []\n".to_string())));
}

#[tokio::test]
async fn test_get_content_lists_directory() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/test-org/admin/contents/.github"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "settings.yml", "path": ".github/settings.yml", "type": "file", "sha": "aaa" },
            { "name": "repos", "path": ".github/repos", "type": "dir", "sha": "bbb" }
        ])))
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    let content = client
        .get_content("test-org", "admin", ".github", None)
        .await
        .unwrap();

    match content {
        Some(FileContent::Directory(entries)) => {
            assert_eq!(entries.len(), 2);
            assert!(entries[1].is_dir());
            assert_eq!(entries[1].sha, "bbb");
        }
        other => panic!("expected a directory listing, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_content_missing_file_is_none() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/test-org/admin/contents/.github/suborgs"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found",
            "documentation_url": "https://docs.github.com/rest"
        })))
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    let content = client
        .get_content("test-org", "admin", ".github/suborgs", None)
        .await
        .unwrap();

    assert!(content.is_none());
}

#[tokio::test]
async fn test_get_repository_maps_404_to_not_found() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/test-org/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found",
            "documentation_url": "https://docs.github.com/rest"
        })))
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    let result = client.get_repository("test-org", "missing").await;

    assert!(matches!(result, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_send_reports_validation_failure_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/test-org/repo/labels"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "Validation Failed",
            "documentation_url": "https://docs.github.com/rest"
        })))
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    let result = client
        .send(
            HttpMethod::Post,
            "/repos/test-org/repo/labels",
            Some(&json!({ "name": "bug" })),
        )
        .await;

    match result {
        Err(Error::Status { status, message }) => {
            assert_eq!(status, 422);
            assert_eq!(message, "Validation Failed");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_resources_follows_pages() {
    let mock_server = MockServer::start().await;
    let first_page: Vec<Value> = (0..PAGE_SIZE)
        .map(|i| json!({ "name": format!("label-{i}") }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/repos/test-org/repo/labels"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(first_page)))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/test-org/repo/labels"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "last" }])))
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    let items = client
        .list_resources("/repos/test-org/repo/labels", None)
        .await
        .unwrap();

    assert_eq!(items.len(), PAGE_SIZE + 1);
    assert_eq!(items[PAGE_SIZE]["name"], "last");
}

#[tokio::test]
async fn test_list_resources_unwraps_items_key() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/test-org/repo/environments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "environments": [{ "name": "production" }]
        })))
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    let items = client
        .list_resources("/repos/test-org/repo/environments", Some("environments"))
        .await
        .unwrap();

    assert_eq!(items, vec![json!({ "name": "production" })]);
}

#[tokio::test]
async fn test_send_delete_without_body_returns_null() {
    let mock_server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/repos/test-org/repo/labels/old"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    let value = client
        .send(HttpMethod::Delete, "/repos/test-org/repo/labels/old", None)
        .await
        .unwrap();

    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_create_issue_comment_posts_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/test-org/admin/issues/7/comments"))
        .and(body_json(json!({ "body": "report" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 1 })))
        .expect(1)
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    client
        .create_issue_comment("test-org", "admin", 7, "report")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_latest_commit_sha_reads_first_commit() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/test-org/admin/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "sha": "abc123" }
        ])))
        .mount(&mock_server)
        .await;
    let client = client_for(&mock_server).await;

    let sha = client.latest_commit_sha("test-org", "admin").await.unwrap();

    assert_eq!(sha, "abc123");
}

#[test]
fn test_encode_path_segment_escapes_spaces() {
    assert_eq!(encode_path_segment("good first issue"), "good%20first%20issue");
    assert_eq!(encode_path_segment("plain"), "plain");
}

#[test]
fn test_encode_path_keeps_separators() {
    assert_eq!(encode_path(".github/repos/my repo.yml"), ".github/repos/my%20repo.yml");
}

#[test]
fn test_with_query_appends_parameters() {
    assert_eq!(with_query("/a", "page", "1"), "/a?page=1");
    assert_eq!(with_query("/a?x=1", "ref", "refs/heads/main"), "/a?x=1&ref=refs%2Fheads%2Fmain");
}

#[tokio::test]
async fn test_mock_client_records_mutations() {
    let mock = mock::MockSettingsClient::new().with_file(".github/settings.yml", "labels: []");

    let content = mock
        .get_content("org", "admin", ".github/settings.yml", None)
        .await
        .unwrap();
    mock.send(HttpMethod::Post, "/repos/org/r/labels", Some(&json!({ "name": "a" })))
        .await
        .unwrap();

    assert_eq!(content, Some(FileContent::File("labels: []".to_string())));
    assert_eq!(mock.calls().len(), 1);
    assert_eq!(mock.calls_with(HttpMethod::Post)[0].path, "/repos/org/r/labels");
}
