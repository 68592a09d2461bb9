//! Crate for interacting with the GitHub REST API.
//!
//! This crate provides the [`SettingsClient`] trait, the single boundary the
//! settings sync engine uses to read configuration files and live repository
//! state and to write changes back, together with [`GitHubClient`], its
//! octocrab-backed implementation.
//!
//! Resource entities are exchanged as `serde_json::Value`. The engine decides
//! which fields matter; this crate only moves JSON over HTTP.

use async_trait::async_trait;
use base64::Engine as _;
use jsonwebtoken::EncodingKey;
use octocrab::{Octocrab, Result as OctocrabResult};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, error, info, instrument};
use url::Url;

pub mod errors;
pub use errors::Error;

pub mod contents;
pub use contents::{EntryType, FileContent, GitTree, GitTreeItem, TreeEntry};

pub mod models;
pub use models::{CheckConclusion, CheckRunOutput, CheckRunPayload, HttpMethod, Repository};

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

// Reference the tests module in the separate file
#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Page size requested from list endpoints.
const PAGE_SIZE: usize = 100;

/// Remote operations needed to enforce repository settings.
///
/// Reads cover the admin repository (configuration files), repository
/// membership lookups (installation, team, custom property), and live
/// resource state. Writes cover resource mutations and run reporting.
///
/// Implementations must be `Send + Sync`; the engine fans calls out across
/// many concurrent tasks.
#[async_trait]
pub trait SettingsClient: Send + Sync {
    /// Reads a path from a repository at an optional ref.
    ///
    /// Returns `Ok(None)` when the path does not exist.
    async fn get_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<FileContent>, Error>;

    /// Reads a git tree (non-recursive) by SHA.
    async fn get_tree(&self, owner: &str, repo: &str, tree_sha: &str) -> Result<GitTree, Error>;

    /// Lists every repository the app installation can access.
    async fn list_installation_repositories(&self) -> Result<Vec<Repository>, Error>;

    /// Lists the repositories a team has access to.
    async fn list_team_repositories(
        &self,
        org: &str,
        team_slug: &str,
    ) -> Result<Vec<Repository>, Error>;

    /// Lists the names of repositories whose custom property `name` equals `value`.
    async fn list_repositories_with_property(
        &self,
        org: &str,
        name: &str,
        value: &str,
    ) -> Result<Vec<String>, Error>;

    /// Fetches the raw repository payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the repository does not exist.
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Value, Error>;

    /// Fetches every page of a list endpoint.
    ///
    /// Most endpoints answer with a JSON array; some wrap the array in an
    /// object, in which case `items_key` names the wrapping field.
    async fn list_resources(&self, path: &str, items_key: Option<&str>)
        -> Result<Vec<Value>, Error>;

    /// Fetches a single resource.
    async fn get_resource(&self, path: &str) -> Result<Value, Error>;

    /// Sends a mutation. Responses without a body come back as `Value::Null`.
    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, Error>;

    /// Returns the SHA of the most recent commit on the default branch.
    async fn latest_commit_sha(&self, owner: &str, repo: &str) -> Result<String, Error>;

    /// Creates a completed check run.
    async fn create_check_run(
        &self,
        owner: &str,
        repo: &str,
        payload: &CheckRunPayload,
    ) -> Result<(), Error>;

    /// Completes an existing check run.
    async fn update_check_run(
        &self,
        owner: &str,
        repo: &str,
        check_run_id: u64,
        payload: &CheckRunPayload,
    ) -> Result<(), Error>;

    /// Posts a comment on an issue or pull request.
    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<(), Error>;
}

/// A client for interacting with the GitHub API.
#[derive(Debug)]
pub struct GitHubClient {
    client: Octocrab,
}

impl GitHubClient {
    /// Creates a new `GitHubClient` from an authenticated octocrab instance.
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Gets an installation access token for a specific organization.
    ///
    /// This method finds the installation for the given organization and returns
    /// an access token that can be used for API calls on its behalf.
    ///
    /// # Errors
    ///
    /// Returns an `Error::InvalidResponse` if:
    /// - The API call fails
    /// - No installation is found for the organization
    /// - The token cannot be retrieved
    #[instrument(skip(self), fields(org_name = %org_name))]
    pub async fn get_installation_token_for_org(&self, org_name: &str) -> Result<String, Error> {
        let installations = self.list_installations().await?;

        debug!(
            org_name = org_name,
            installation_count = installations.len(),
            "Retrieved installations, searching for organization"
        );

        let installation = installations
            .into_iter()
            .find(|inst| inst.account.login.eq_ignore_ascii_case(org_name))
            .ok_or_else(|| {
                error!(
                    org_name = org_name,
                    "No installation found for organization - this means the GitHub App is not installed on this organization"
                );
                Error::InvalidResponse
            })?;

        let (_, token) = self
            .client
            .installation_and_token(installation.id.into())
            .await
            .map_err(|e| {
                log_octocrab_error("Failed to get installation token", e);
                Error::InvalidResponse
            })?;

        info!(
            org_name = org_name,
            installation_id = installation.id,
            "Successfully retrieved installation token"
        );
        Ok(token.expose_secret().to_string())
    }

    /// Lists all installations for the authenticated GitHub App.
    ///
    /// # Errors
    ///
    /// Returns an `Error::InvalidResponse` if the API call fails or the response
    /// cannot be parsed.
    #[instrument(skip(self))]
    pub async fn list_installations(&self) -> Result<Vec<models::Installation>, Error> {
        let result: OctocrabResult<Vec<octocrab::models::Installation>> =
            self.client.get("/app/installations", None::<&()>).await;

        match result {
            Ok(installations) => Ok(installations
                .into_iter()
                .map(models::Installation::from)
                .collect()),
            Err(e) => {
                error!(
                    "Failed to list installations - this likely means JWT authentication failed"
                );
                log_octocrab_error("Failed to list installations", e);
                Err(Error::InvalidResponse)
            }
        }
    }

    /// Issues a GET and parses the body as JSON. An empty body becomes `Value::Null`.
    async fn get_json(&self, path: &str) -> Result<Value, Error> {
        self.execute(None, path, None).await
    }

    /// Issues a request and parses the body as JSON.
    ///
    /// `None` as the method means GET. Bodies are only sent for mutations.
    async fn execute(
        &self,
        method: Option<HttpMethod>,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let uri = build_uri(path)?;
        let response = match method {
            None => self.client._get(uri).await,
            Some(HttpMethod::Post) => self.client._post(uri, body).await,
            Some(HttpMethod::Patch) => self.client._patch(uri, body).await,
            Some(HttpMethod::Put) => self.client._put(uri, body).await,
            Some(HttpMethod::Delete) => self.client._delete(uri, body).await,
        }
        .map_err(|e| map_octocrab_error("Request to GitHub failed", e))?;

        let response = octocrab::map_github_error(response)
            .await
            .map_err(|e| map_octocrab_error("GitHub rejected the request", e))?;
        let text = self
            .client
            .body_to_string(response)
            .await
            .map_err(|e| map_octocrab_error("Failed to read response body", e))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl SettingsClient for GitHubClient {
    #[instrument(skip(self), fields(owner = %owner, repo = %repo, path = %path))]
    async fn get_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<FileContent>, Error> {
        let mut route = format!(
            "/repos/{}/{}/contents/{}",
            encode_path_segment(owner),
            encode_path_segment(repo),
            encode_path(path)
        );
        if let Some(git_ref) = git_ref {
            route = with_query(&route, "ref", git_ref);
        }

        let value = match self.get_json(&route).await {
            Ok(value) => value,
            Err(Error::NotFound) => {
                debug!(path = path, "Content not found");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if value.is_array() {
            let entries: Vec<TreeEntry> = serde_json::from_value(value)?;
            return Ok(Some(FileContent::Directory(entries)));
        }

        match value.get("content").and_then(Value::as_str) {
            Some(encoded) => {
                let compact: String = encoded.split_whitespace().collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| {
                        error!(path = path, error = %e, "File content is not valid base64");
                        Error::InvalidResponse
                    })?;
                let text = String::from_utf8(bytes).map_err(|_| Error::InvalidResponse)?;
                Ok(Some(FileContent::File(text)))
            }
            None => Ok(Some(FileContent::Unsupported)),
        }
    }

    #[instrument(skip(self), fields(owner = %owner, repo = %repo))]
    async fn get_tree(&self, owner: &str, repo: &str, tree_sha: &str) -> Result<GitTree, Error> {
        let route = format!(
            "/repos/{}/{}/git/trees/{}",
            encode_path_segment(owner),
            encode_path_segment(repo),
            encode_path_segment(tree_sha)
        );
        let value = self.get_json(&route).await?;
        Ok(serde_json::from_value(value)?)
    }

    #[instrument(skip(self))]
    async fn list_installation_repositories(&self) -> Result<Vec<Repository>, Error> {
        let values = self
            .list_resources("/installation/repositories", Some("repositories"))
            .await?;
        let repositories = values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Repository>, _>>()?;
        info!(
            count = repositories.len(),
            "Retrieved installation repositories"
        );
        Ok(repositories)
    }

    #[instrument(skip(self), fields(org = %org, team = %team_slug))]
    async fn list_team_repositories(
        &self,
        org: &str,
        team_slug: &str,
    ) -> Result<Vec<Repository>, Error> {
        let route = format!(
            "/orgs/{}/teams/{}/repos",
            encode_path_segment(org),
            encode_path_segment(team_slug)
        );
        let values = self.list_resources(&route, None).await?;
        Ok(values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Repository>, _>>()?)
    }

    #[instrument(skip(self), fields(org = %org, property = %name))]
    async fn list_repositories_with_property(
        &self,
        org: &str,
        name: &str,
        value: &str,
    ) -> Result<Vec<String>, Error> {
        let query = format!("props.{}:{}", name, value);
        let route = with_query(
            &format!("/orgs/{}/properties/values", encode_path_segment(org)),
            "repository_query",
            &query,
        );
        let values = self.list_resources(&route, None).await?;
        Ok(values
            .iter()
            .filter_map(|v| v.get("repository_name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    #[instrument(skip(self), fields(owner = %owner, repo = %repo))]
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Value, Error> {
        let route = format!(
            "/repos/{}/{}",
            encode_path_segment(owner),
            encode_path_segment(repo)
        );
        self.get_json(&route).await
    }

    #[instrument(skip(self))]
    async fn list_resources(
        &self,
        path: &str,
        items_key: Option<&str>,
    ) -> Result<Vec<Value>, Error> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let route = with_query(
                &with_query(path, "per_page", &PAGE_SIZE.to_string()),
                "page",
                &page.to_string(),
            );
            let body = self.get_json(&route).await?;
            let page_items = match (body, items_key) {
                (Value::Array(values), _) => values,
                (Value::Object(mut map), Some(key)) => match map.remove(key) {
                    Some(Value::Array(values)) => values,
                    _ => {
                        error!(path = path, key = key, "List response is missing its items field");
                        return Err(Error::InvalidResponse);
                    }
                },
                _ => return Err(Error::InvalidResponse),
            };

            let count = page_items.len();
            items.extend(page_items);
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        debug!(path = path, count = items.len(), "Listed resources");
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn get_resource(&self, path: &str) -> Result<Value, Error> {
        self.get_json(path).await
    }

    #[instrument(skip(self, body))]
    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let value = self.execute(Some(method), path, body).await?;
        debug!(method = %method, path = path, "Sent mutation");
        Ok(value)
    }

    #[instrument(skip(self), fields(owner = %owner, repo = %repo))]
    async fn latest_commit_sha(&self, owner: &str, repo: &str) -> Result<String, Error> {
        let route = format!(
            "/repos/{}/{}/commits?per_page=1",
            encode_path_segment(owner),
            encode_path_segment(repo)
        );
        let commits = self.get_json(&route).await?;
        commits
            .get(0)
            .and_then(|c| c.get("sha"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(Error::InvalidResponse)
    }

    #[instrument(skip(self, payload), fields(owner = %owner, repo = %repo))]
    async fn create_check_run(
        &self,
        owner: &str,
        repo: &str,
        payload: &CheckRunPayload,
    ) -> Result<(), Error> {
        let route = format!(
            "/repos/{}/{}/check-runs",
            encode_path_segment(owner),
            encode_path_segment(repo)
        );
        let body = serde_json::to_value(payload)?;
        self.send(HttpMethod::Post, &route, Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, payload), fields(owner = %owner, repo = %repo))]
    async fn update_check_run(
        &self,
        owner: &str,
        repo: &str,
        check_run_id: u64,
        payload: &CheckRunPayload,
    ) -> Result<(), Error> {
        let route = format!(
            "/repos/{}/{}/check-runs/{}",
            encode_path_segment(owner),
            encode_path_segment(repo),
            check_run_id
        );
        let body = serde_json::to_value(payload)?;
        self.send(HttpMethod::Patch, &route, Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, body), fields(owner = %owner, repo = %repo))]
    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<(), Error> {
        let route = format!(
            "/repos/{}/{}/issues/{}/comments",
            encode_path_segment(owner),
            encode_path_segment(repo),
            issue_number
        );
        let payload = serde_json::json!({ "body": body });
        self.send(HttpMethod::Post, &route, Some(&payload)).await?;
        Ok(())
    }
}

/// Percent-encodes a single path segment (e.g. a label name with spaces).
pub fn encode_path_segment(segment: &str) -> String {
    let mut url = match Url::parse("https://api.github.com/") {
        Ok(url) => url,
        Err(_) => return segment.to_string(),
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(segment);
    }
    url.path().trim_start_matches('/').to_string()
}

/// Percent-encodes every segment of a slash-separated path.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(encode_path_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn with_query(route: &str, key: &str, value: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
    let separator = if route.contains('?') { '&' } else { '?' };
    format!("{route}{separator}{key}={encoded}")
}

fn build_uri(path: &str) -> Result<http::Uri, Error> {
    http::Uri::builder()
        .path_and_query(path)
        .build()
        .map_err(|e| {
            error!(path = path, error = %e, "Failed to build request URI");
            Error::ApiError()
        })
}

fn map_octocrab_error(message: &str, e: octocrab::Error) -> Error {
    if let octocrab::Error::GitHub { source, .. } = &e {
        let status = source.status_code.as_u16();
        let github_message = source.message.clone();
        match status {
            404 => return Error::NotFound,
            429 => return Error::RateLimitExceeded,
            403 if github_message.to_lowercase().contains("rate limit") => {
                return Error::RateLimitExceeded
            }
            _ => {
                log_octocrab_error(message, e);
                return Error::Status {
                    status,
                    message: github_message,
                };
            }
        }
    }

    log_octocrab_error(message, e);
    Error::InvalidResponse
}

/// Creates an `Octocrab` client authenticated as a GitHub App using a JWT token.
///
/// # Errors
///
/// This function returns an `Error` in the following cases:
/// - If the private key cannot be parsed.
/// - If the `Octocrab` client cannot be built.
#[instrument(skip(private_key))]
pub async fn create_app_client(app_id: u64, private_key: &str) -> Result<Octocrab, Error> {
    let key = EncodingKey::from_rsa_pem(private_key.as_bytes()).map_err(|e| {
        error!(
            app_id = app_id,
            error = %e,
            "Failed to parse RSA private key - key format is invalid"
        );
        Error::AuthError(format!(
            "Failed to translate the private key. Error was: {}",
            e
        ))
    })?;

    let octocrab = Octocrab::builder()
        .app(app_id.into(), key)
        .build()
        .map_err(|e| {
            error!(
                app_id = app_id,
                error = ?e,
                "Failed to build Octocrab client with GitHub App credentials"
            );
            Error::AuthError("Failed to get a personal token for the app install.".to_string())
        })?;

    info!(app_id = app_id, "Successfully created GitHub App client");

    Ok(octocrab)
}

#[instrument(skip(token))]
pub fn create_token_client(token: &str) -> Result<Octocrab, Error> {
    Octocrab::builder()
        .personal_token(token.to_string())
        .build()
        .map_err(|_| Error::ApiError())
}

fn log_octocrab_error(message: &str, e: octocrab::Error) {
    match e {
        octocrab::Error::GitHub { source, backtrace } => {
            let err = source;
            error!(
                error_message = err.message,
                backtrace = backtrace.to_string(),
                "{}. Received an error from GitHub",
                message
            )
        }
        octocrab::Error::UriParse { source, backtrace } => error!(
            error_message = source.to_string(),
            backtrace = backtrace.to_string(),
            "{}. Failed to parse URI.",
            message
        ),

        octocrab::Error::Uri { source, backtrace } => error!(
            error_message = source.to_string(),
            backtrace = backtrace.to_string(),
            "{}, Failed to parse URI.",
            message
        ),
        octocrab::Error::InvalidHeaderValue { source, backtrace } => error!(
            error_message = source.to_string(),
            backtrace = backtrace.to_string(),
            "{}. One of the header values was invalid.",
            message
        ),
        octocrab::Error::InvalidUtf8 { source, backtrace } => error!(
            error_message = source.to_string(),
            backtrace = backtrace.to_string(),
            "{}. The message wasn't valid UTF-8.",
            message,
        ),
        _ => error!(error_message = e.to_string(), message),
    };
}
