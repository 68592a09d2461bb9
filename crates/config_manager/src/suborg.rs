//! Sub-org membership resolution.
//!
//! A sub-org document selects repositories three ways: explicit names or glob
//! patterns (`suborgrepos`), team access (`suborgteams`) and custom property
//! values (`suborgproperties`). [`SubOrgResolver`] expands team and property
//! selectors through the GitHub API and records, for every selected key, the
//! document that governs it. A key claimed by two different documents is an
//! authoring error and fails resolution outright.

use crate::{ConfigurationError, ConfigurationResult, SubOrgConfig};
use futures::future::try_join_all;
use github_client::SettingsClient;
use glob::Pattern;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(test)]
#[path = "suborg_tests.rs"]
mod tests;

#[derive(Debug, Clone)]
struct SubOrgEntry {
    key: String,
    pattern: Option<Pattern>,
    config: Arc<SubOrgConfig>,
}

impl SubOrgEntry {
    fn new(key: &str, config: Arc<SubOrgConfig>) -> Self {
        Self {
            key: key.to_string(),
            pattern: Pattern::new(key).ok(),
            config,
        }
    }

    fn matches(&self, repo_name: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.matches(repo_name),
            None => self.key == repo_name,
        }
    }
}

/// Resolved mapping from repository name or glob pattern to the sub-org
/// document governing it, in document-processing order.
#[derive(Debug, Clone, Default)]
pub struct SubOrgMap {
    entries: Vec<SubOrgEntry>,
}

impl SubOrgMap {
    /// Records `key` for `config`.
    ///
    /// Re-recording a key for the same document is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SubOrgConflict` when another document already holds `key`.
    pub fn insert(&mut self, key: &str, config: &Arc<SubOrgConfig>) -> ConfigurationResult<()> {
        if let Some(existing) = self.entries.iter().find(|e| e.key == key) {
            if existing.config.source() != config.source() {
                return Err(ConfigurationError::SubOrgConflict {
                    repository: key.to_string(),
                    first: config.source().to_string(),
                    second: existing.config.source().to_string(),
                });
            }
            return Ok(());
        }

        self.entries.push(SubOrgEntry::new(key, Arc::clone(config)));
        Ok(())
    }

    /// Finds the sub-org governing `repo_name`: the first key, in
    /// processing order, whose anchored glob matches the name.
    pub fn lookup(&self, repo_name: &str) -> Option<&SubOrgConfig> {
        self.entries
            .iter()
            .find(|e| e.matches(repo_name))
            .map(|e| e.config.as_ref())
    }

    /// Keeps only the entries that came from the document at `source`.
    pub fn retain_source(&mut self, source: &str) {
        self.entries.retain(|e| e.config.source() == source);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a [`SubOrgMap`] for an organization.
pub struct SubOrgResolver<'a> {
    client: &'a dyn SettingsClient,
    org: &'a str,
}

impl<'a> SubOrgResolver<'a> {
    pub fn new(client: &'a dyn SettingsClient, org: &'a str) -> Self {
        Self { client, org }
    }

    /// Resolves the membership of every document.
    ///
    /// Documents are processed in order; within one document, team and
    /// property lookups run concurrently. When `changed_source` is given the
    /// result only keeps entries recorded for that document, so a sub-org
    /// edit touches just the repositories it governs.
    ///
    /// # Errors
    ///
    /// Returns `SubOrgConflict` when two documents claim the same key, and
    /// `FileAccessError` when a team or property lookup fails.
    pub async fn resolve(
        &self,
        documents: &[SubOrgConfig],
        changed_source: Option<&str>,
    ) -> ConfigurationResult<SubOrgMap> {
        let mut map = SubOrgMap::default();

        for document in documents {
            let config = Arc::new(document.clone());

            for key in document.repos() {
                map.insert(key, &config)?;
            }

            for repo_name in self.team_members(document).await? {
                map.insert(&repo_name, &config)?;
            }

            for repo_name in self.property_members(document).await? {
                map.insert(&repo_name, &config)?;
            }

            debug!(source = document.source(), "Resolved sub-org membership");
        }

        if let Some(source) = changed_source {
            map.retain_source(source);
            info!(
                source = source,
                entries = map.len(),
                "Scoped sub-org map to changed document"
            );
        }

        Ok(map)
    }

    async fn team_members(&self, document: &SubOrgConfig) -> ConfigurationResult<Vec<String>> {
        let lookups = document.teams().iter().map(|team| async move {
            self.client
                .list_team_repositories(self.org, team)
                .await
                .map_err(|e| ConfigurationError::FileAccessError {
                    path: document.source().to_string(),
                    reason: format!("failed to list repositories of team {team}: {e}"),
                })
        });

        let results = try_join_all(lookups).await?;
        Ok(results
            .into_iter()
            .flatten()
            .map(|repo| repo.name)
            .collect())
    }

    async fn property_members(&self, document: &SubOrgConfig) -> ConfigurationResult<Vec<String>> {
        let lookups = document.properties().iter().map(|query| async move {
            self.client
                .list_repositories_with_property(self.org, &query.name, &query.value)
                .await
                .map_err(|e| ConfigurationError::FileAccessError {
                    path: document.source().to_string(),
                    reason: format!(
                        "failed to query repositories with {}={}: {e}",
                        query.name, query.value
                    ),
                })
        });

        let results = try_join_all(lookups).await?;
        Ok(results.into_iter().flatten().collect())
    }
}
