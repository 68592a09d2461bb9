//! Loading of settings documents from the admin repository.
//!
//! All documents live in one repository per organization (the admin repo),
//! under a configurable directory:
//!
//! ```text
//! <config_path>/<settings_file>       org settings
//! <config_path>/suborgs/*.yml         sub-org documents
//! <config_path>/repos/<repo>.yml      repo overrides
//! ```
//!
//! A path that does not exist is "no configuration", never an error.

use crate::{
    documents::parse_yaml, ConfigurationError, ConfigurationResult, OrgConfig, RepoOverride,
    Sections, SubOrgConfig, SubOrgMap,
};
use async_trait::async_trait;
use github_client::{FileContent, SettingsClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "config_store_tests.rs"]
mod tests;

const SUBORGS_DIR: &str = "suborgs";
const REPOS_DIR: &str = "repos";

/// Where settings documents live and how runs report.
///
/// # Examples
///
/// ```rust
/// use config_manager::EngineSettings;
///
/// let settings = EngineSettings::default();
///
/// assert_eq!(settings.admin_repo, "admin");
/// assert_eq!(settings.settings_path(), ".github/settings.yml");
/// assert_eq!(settings.repos_path(), ".github/repos");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Repository holding the settings documents.
    pub admin_repo: String,
    /// Directory of the settings documents inside the admin repository.
    pub config_path: String,
    /// File name of the org settings document.
    pub settings_file: String,
    /// Post the dry-run report as a pull request comment.
    pub create_pr_comment: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            admin_repo: "admin".to_string(),
            config_path: ".github".to_string(),
            settings_file: "settings.yml".to_string(),
            create_pr_comment: false,
        }
    }
}

impl EngineSettings {
    pub fn settings_path(&self) -> String {
        join(&self.config_path, &self.settings_file)
    }

    pub fn suborgs_path(&self) -> String {
        join(&self.config_path, SUBORGS_DIR)
    }

    pub fn repos_path(&self) -> String {
        join(&self.config_path, REPOS_DIR)
    }
}

fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Which repo override documents a run needs.
#[derive(Debug, Clone, Copy)]
pub enum OverrideFilter<'a> {
    /// Only the document of one repository.
    Repository(&'a str),
    /// Only documents whose repository is governed by the given sub-orgs.
    SubOrg(&'a SubOrgMap),
    All,
}

impl OverrideFilter<'_> {
    fn accepts(&self, file_name: &str) -> bool {
        let stem = file_stem(file_name);
        match self {
            Self::Repository(repo) => stem != file_name && stem == *repo,
            Self::SubOrg(map) => map.lookup(stem).is_some(),
            Self::All => true,
        }
    }
}

fn file_stem(file_name: &str) -> &str {
    file_name
        .strip_suffix(".yml")
        .or_else(|| file_name.strip_suffix(".yaml"))
        .unwrap_or(file_name)
}

/// Source of the settings documents of an organization.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Loads the org settings file. A missing file yields an empty config.
    async fn load_org_config(&self, owner: &str, git_ref: Option<&str>)
        -> ConfigurationResult<OrgConfig>;

    /// Loads every non-empty sub-org document, in directory order.
    async fn load_suborg_configs(
        &self,
        owner: &str,
        git_ref: Option<&str>,
    ) -> ConfigurationResult<Vec<SubOrgConfig>>;

    /// Loads the repo override documents selected by `filter`.
    async fn load_repo_overrides(
        &self,
        owner: &str,
        git_ref: Option<&str>,
        filter: OverrideFilter<'_>,
    ) -> ConfigurationResult<Vec<RepoOverride>>;
}

/// [`ConfigStore`] reading the admin repository through the GitHub API.
pub struct GitHubConfigStore {
    client: Arc<dyn SettingsClient>,
    settings: EngineSettings,
}

impl GitHubConfigStore {
    pub fn new(client: Arc<dyn SettingsClient>, settings: EngineSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Reads and parses one YAML document.
    ///
    /// Returns `None` when the path is missing, is a directory, or is not a
    /// regular file.
    async fn load_yaml(
        &self,
        owner: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> ConfigurationResult<Option<Sections>> {
        let content = self
            .client
            .get_content(owner, &self.settings.admin_repo, path, git_ref)
            .await
            .map_err(|e| ConfigurationError::FileAccessError {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        match content {
            Some(FileContent::File(text)) => parse_yaml(path, &text).map(Some),
            Some(FileContent::Directory(_)) => {
                debug!(path = path, "Ignoring directory where a settings file was expected");
                Ok(None)
            }
            Some(FileContent::Unsupported) => {
                warn!(path = path, "Ignoring settings path that is not a regular file");
                Ok(None)
            }
            None => {
                debug!(path = path, "Settings file not found");
                Ok(None)
            }
        }
    }

    async fn list_directory(
        &self,
        owner: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> ConfigurationResult<Vec<github_client::TreeEntry>> {
        let content = self
            .client
            .get_content(owner, &self.settings.admin_repo, path, git_ref)
            .await
            .map_err(|e| ConfigurationError::FileAccessError {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        match content {
            Some(FileContent::Directory(entries)) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl ConfigStore for GitHubConfigStore {
    async fn load_org_config(
        &self,
        owner: &str,
        git_ref: Option<&str>,
    ) -> ConfigurationResult<OrgConfig> {
        let path = self.settings.settings_path();
        match self.load_yaml(owner, &path, git_ref).await? {
            Some(sections) => OrgConfig::from_sections(sections),
            None => {
                info!(owner = owner, path = %path, "No org settings file, using empty config");
                Ok(OrgConfig::default())
            }
        }
    }

    async fn load_suborg_configs(
        &self,
        owner: &str,
        git_ref: Option<&str>,
    ) -> ConfigurationResult<Vec<SubOrgConfig>> {
        let dir = self.settings.suborgs_path();
        let entries = self.list_directory(owner, &dir, git_ref).await?;

        let mut configs = Vec::new();
        for entry in entries.iter().filter(|e| e.is_file()) {
            let path = join(&dir, &entry.name);
            match self.load_yaml(owner, &path, git_ref).await? {
                Some(sections) if !sections.is_empty() => {
                    configs.push(SubOrgConfig::from_sections(&path, sections)?);
                }
                _ => debug!(path = %path, "Skipping empty sub-org document"),
            }
        }

        debug!(owner = owner, count = configs.len(), "Loaded sub-org documents");
        Ok(configs)
    }

    async fn load_repo_overrides(
        &self,
        owner: &str,
        git_ref: Option<&str>,
        filter: OverrideFilter<'_>,
    ) -> ConfigurationResult<Vec<RepoOverride>> {
        // The contents API caps directory listings, so the repos directory is
        // read as a git tree instead.
        let listing = self
            .list_directory(owner, &self.settings.config_path, git_ref)
            .await?;
        let Some(repos_dir) = listing.iter().find(|e| e.name == REPOS_DIR && e.is_dir()) else {
            debug!(owner = owner, "No repos directory in the admin repository");
            return Ok(Vec::new());
        };

        let repos_path = self.settings.repos_path();
        let tree = self
            .client
            .get_tree(owner, &self.settings.admin_repo, &repos_dir.sha)
            .await
            .map_err(|e| ConfigurationError::FileAccessError {
                path: repos_path.clone(),
                reason: e.to_string(),
            })?;
        if tree.truncated {
            return Err(ConfigurationError::TruncatedTree { path: repos_path });
        }

        let mut overrides = Vec::new();
        for item in tree.entries.iter().filter(|i| filter.accepts(&i.path)) {
            let path = join(&repos_path, &item.path);
            if let Some(sections) = self.load_yaml(owner, &path, git_ref).await? {
                overrides.push(RepoOverride::new(file_stem(&item.path), &path, sections));
            }
        }

        info!(owner = owner, count = overrides.len(), "Loaded repo override documents");
        Ok(overrides)
    }
}
