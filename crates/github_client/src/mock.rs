//! In-memory [`SettingsClient`] for tests.
//!
//! The mock serves configuration files, trees, membership lookups, live
//! repositories and resource lists from maps populated with builder methods,
//! and records every mutation so tests can assert on what would have been
//! sent to GitHub.
//!
//! Enable with the `test-support` feature.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    CheckRunPayload, Error, FileContent, GitTree, GitTreeItem, HttpMethod, Repository,
    SettingsClient, TreeEntry,
};

/// A mutation recorded by [`MockSettingsClient::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

/// A check run written through the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCheckRun {
    pub owner: String,
    pub repo: String,
    /// `None` when the run was created rather than updated.
    pub check_run_id: Option<u64>,
    pub payload: CheckRunPayload,
}

/// A comment posted through the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedComment {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub body: String,
}

#[derive(Debug, Default)]
struct MockState {
    contents: HashMap<String, FileContent>,
    trees: HashMap<String, GitTree>,
    installation_repositories: Vec<Repository>,
    team_repositories: HashMap<String, Vec<Repository>>,
    property_repositories: HashMap<(String, String), Vec<String>>,
    repositories: HashMap<String, Value>,
    resource_lists: HashMap<String, Vec<Value>>,
    resources: HashMap<String, Value>,
    failing_paths: HashSet<String>,
    head_sha: Option<String>,
    calls: Vec<RecordedCall>,
    check_runs: Vec<RecordedCheckRun>,
    comments: Vec<RecordedComment>,
}

/// In-memory GitHub used by the engine tests.
#[derive(Debug, Default)]
pub struct MockSettingsClient {
    state: Mutex<MockState>,
}

impl MockSettingsClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded calls from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Serves `text` as the file at `path` (any owner, repo and ref).
    pub fn with_file(self, path: &str, text: &str) -> Self {
        self.state()
            .contents
            .insert(path.to_string(), FileContent::File(text.to_string()));
        self
    }

    /// Serves a directory listing at `path`. Entries are `(name, sha, is_dir)`.
    pub fn with_directory(self, path: &str, entries: &[(&str, &str, bool)]) -> Self {
        let listing = entries
            .iter()
            .map(|(name, sha, is_dir)| TreeEntry {
                name: name.to_string(),
                path: format!("{}/{}", path.trim_end_matches('/'), name),
                entry_type: if *is_dir {
                    crate::EntryType::Dir
                } else {
                    crate::EntryType::File
                },
                sha: sha.to_string(),
                size: 0,
            })
            .collect();
        self.state()
            .contents
            .insert(path.to_string(), FileContent::Directory(listing));
        self
    }

    /// Serves a git tree with the given entry paths.
    pub fn with_tree(self, sha: &str, paths: &[&str], truncated: bool) -> Self {
        let tree = GitTree {
            sha: sha.to_string(),
            entries: paths
                .iter()
                .enumerate()
                .map(|(i, p)| GitTreeItem {
                    path: p.to_string(),
                    sha: format!("{sha}-{i}"),
                })
                .collect(),
            truncated,
        };
        self.state().trees.insert(sha.to_string(), tree);
        self
    }

    /// Adds a repository to the installation listing and to `get_repository`.
    pub fn with_installation_repository(self, owner: &str, name: &str) -> Self {
        {
            let mut state = self.state();
            state
                .installation_repositories
                .push(Repository::new(owner, name));
            state
                .repositories
                .entry(format!("{owner}/{name}"))
                .or_insert_with(|| repository_payload(owner, name, false));
        }
        self
    }

    /// Replaces the live payload served for `owner/name`.
    pub fn with_repository(self, owner: &str, name: &str, payload: Value) -> Self {
        self.state()
            .repositories
            .insert(format!("{owner}/{name}"), payload);
        self
    }

    pub fn with_team(self, slug: &str, repositories: &[&str]) -> Self {
        let repos = repositories
            .iter()
            .map(|name| Repository::new("org", *name))
            .collect();
        self.state()
            .team_repositories
            .insert(slug.to_string(), repos);
        self
    }

    pub fn with_property(self, name: &str, value: &str, repositories: &[&str]) -> Self {
        self.state().property_repositories.insert(
            (name.to_string(), value.to_string()),
            repositories.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    /// Serves `items` from the list endpoint at `path`.
    pub fn with_resources(self, path: &str, items: Vec<Value>) -> Self {
        self.state()
            .resource_lists
            .insert(path.to_string(), items);
        self
    }

    /// Serves `value` from the single-resource endpoint at `path`.
    pub fn with_resource(self, path: &str, value: Value) -> Self {
        self.state().resources.insert(path.to_string(), value);
        self
    }

    /// Every request touching exactly `path` fails with `Error::ApiError`.
    pub fn failing(self, path: &str) -> Self {
        self.state().failing_paths.insert(path.to_string());
        self
    }

    pub fn with_head_sha(self, sha: &str) -> Self {
        self.state().head_sha = Some(sha.to_string());
        self
    }

    /// All mutations in the order they were sent.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Mutations sent with `method`.
    pub fn calls_with(&self, method: HttpMethod) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    pub fn check_runs(&self) -> Vec<RecordedCheckRun> {
        self.state().check_runs.clone()
    }

    pub fn comments(&self) -> Vec<RecordedComment> {
        self.state().comments.clone()
    }

    fn check_failing(&self, path: &str) -> Result<(), Error> {
        if self.state().failing_paths.contains(path) {
            return Err(Error::ApiError());
        }
        Ok(())
    }
}

/// A minimal repository payload as served by `GET /repos/{owner}/{repo}`.
pub fn repository_payload(owner: &str, name: &str, archived: bool) -> Value {
    serde_json::json!({
        "name": name,
        "full_name": format!("{owner}/{name}"),
        "owner": { "login": owner },
        "archived": archived,
    })
}

#[async_trait]
impl SettingsClient for MockSettingsClient {
    async fn get_content(
        &self,
        _owner: &str,
        _repo: &str,
        path: &str,
        _git_ref: Option<&str>,
    ) -> Result<Option<FileContent>, Error> {
        self.check_failing(path)?;
        Ok(self.state().contents.get(path).cloned())
    }

    async fn get_tree(&self, _owner: &str, _repo: &str, tree_sha: &str) -> Result<GitTree, Error> {
        self.check_failing(tree_sha)?;
        self.state()
            .trees
            .get(tree_sha)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn list_installation_repositories(&self) -> Result<Vec<Repository>, Error> {
        self.check_failing("/installation/repositories")?;
        Ok(self.state().installation_repositories.clone())
    }

    async fn list_team_repositories(
        &self,
        _org: &str,
        team_slug: &str,
    ) -> Result<Vec<Repository>, Error> {
        self.state()
            .team_repositories
            .get(team_slug)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn list_repositories_with_property(
        &self,
        _org: &str,
        name: &str,
        value: &str,
    ) -> Result<Vec<String>, Error> {
        Ok(self
            .state()
            .property_repositories
            .get(&(name.to_string(), value.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Value, Error> {
        let key = format!("{owner}/{repo}");
        self.check_failing(&format!("/repos/{key}"))?;
        self.state()
            .repositories
            .get(&key)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn list_resources(
        &self,
        path: &str,
        _items_key: Option<&str>,
    ) -> Result<Vec<Value>, Error> {
        self.check_failing(path)?;
        Ok(self
            .state()
            .resource_lists
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_resource(&self, path: &str) -> Result<Value, Error> {
        self.check_failing(path)?;
        self.state()
            .resources
            .get(path)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        self.check_failing(path)?;
        self.state().calls.push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });
        Ok(body.cloned().unwrap_or(Value::Null))
    }

    async fn latest_commit_sha(&self, _owner: &str, _repo: &str) -> Result<String, Error> {
        self.state().head_sha.clone().ok_or(Error::NotFound)
    }

    async fn create_check_run(
        &self,
        owner: &str,
        repo: &str,
        payload: &CheckRunPayload,
    ) -> Result<(), Error> {
        self.state().check_runs.push(RecordedCheckRun {
            owner: owner.to_string(),
            repo: repo.to_string(),
            check_run_id: None,
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn update_check_run(
        &self,
        owner: &str,
        repo: &str,
        check_run_id: u64,
        payload: &CheckRunPayload,
    ) -> Result<(), Error> {
        self.state().check_runs.push(RecordedCheckRun {
            owner: owner.to_string(),
            repo: repo.to_string(),
            check_run_id: Some(check_run_id),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<(), Error> {
        self.state().comments.push(RecordedComment {
            owner: owner.to_string(),
            repo: repo.to_string(),
            issue_number,
            body: body.to_string(),
        });
        Ok(())
    }
}
