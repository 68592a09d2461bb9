//! The `repository` section and the archive gate.
//!
//! Unlike list sections, `repository` describes a single entity: the
//! repository itself. Its identity fields (`name`, `org`, `organization`)
//! select the repository and are never sent as settings. `archived` is owned
//! by the [`ArchiveGate`], which runs before anything else.

use crate::{
    reconciler::{changed_fields, EntitySchema},
    EngineResult, ReconcileAction,
};
use github_client::{encode_path_segment, Error as GitHubError, HttpMethod, SettingsClient};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;

pub const REPOSITORY_SECTION: &str = "repository";
pub const ARCHIVE_PLUGIN: &str = "archive";

const IDENTITY_FIELDS: &[&str] = &["name", "org", "organization", "archived"];
const SCHEMA: EntitySchema = EntitySchema::keyed("name");

fn repo_path(owner: &str, repo: &str) -> String {
    format!(
        "/repos/{}/{}",
        encode_path_segment(owner),
        encode_path_segment(repo)
    )
}

/// Declared repository settings, without identity fields.
fn declared_settings(config: &Value) -> Map<String, Value> {
    config
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(k, _)| !IDENTITY_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Topics compare as a set.
fn same_topics(desired: &Value, live: &Value) -> bool {
    fn sorted(value: &Value) -> Vec<String> {
        let mut topics: Vec<String> = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default();
        topics.sort();
        topics
    }
    sorted(desired) == sorted(live)
}

/// Reconciles the `repository` section against the live repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryPlugin;

impl RepositoryPlugin {
    /// Creates the repository when it does not exist, otherwise updates the
    /// declared settings that differ. Topics are written through their own
    /// endpoint.
    #[instrument(skip(self, client, config), fields(owner = %owner, repo = %repo))]
    pub async fn sync(
        &self,
        client: &dyn SettingsClient,
        owner: &str,
        repo: &str,
        config: &Value,
        nop: bool,
    ) -> EngineResult<Vec<ReconcileAction>> {
        let mut desired = declared_settings(config);
        let topics = desired.remove("topics");

        let live = match client.get_repository(owner, repo).await {
            Ok(live) => live,
            Err(GitHubError::NotFound) => {
                return self.create(client, owner, repo, desired, topics, nop).await;
            }
            Err(e) => return Err(e.into()),
        };

        let mut changed = changed_fields(&SCHEMA, &Value::Object(desired), &live);
        let topics = topics.filter(|t| !same_topics(t, live.get("topics").unwrap_or(&Value::Null)));

        if changed.is_empty() && topics.is_none() {
            debug!("Repository settings already match");
            return Ok(vec![ReconcileAction::noop(
                REPOSITORY_SECTION,
                repo,
                json!({ "name": repo }),
            )]);
        }

        if !nop {
            if !changed.is_empty() {
                let body = Value::Object(changed.clone());
                client
                    .send(HttpMethod::Patch, &repo_path(owner, repo), Some(&body))
                    .await?;
            }
            if let Some(names) = &topics {
                let body = json!({ "names": names });
                let path = format!("{}/topics", repo_path(owner, repo));
                client.send(HttpMethod::Put, &path, Some(&body)).await?;
            }
            info!("Updated repository settings");
        }

        if let Some(names) = topics {
            changed.insert("topics".to_string(), names);
        }
        changed.insert("name".to_string(), Value::String(repo.to_string()));
        Ok(vec![ReconcileAction::update(
            REPOSITORY_SECTION,
            repo,
            Value::Object(changed),
        )])
    }

    async fn create(
        &self,
        client: &dyn SettingsClient,
        owner: &str,
        repo: &str,
        mut settings: Map<String, Value>,
        topics: Option<Value>,
        nop: bool,
    ) -> EngineResult<Vec<ReconcileAction>> {
        settings.insert("name".to_string(), Value::String(repo.to_string()));
        let body = Value::Object(settings);

        if !nop {
            let path = format!("/orgs/{}/repos", encode_path_segment(owner));
            client.send(HttpMethod::Post, &path, Some(&body)).await?;
            if let Some(names) = &topics {
                let path = format!("{}/topics", repo_path(owner, repo));
                client
                    .send(HttpMethod::Put, &path, Some(&json!({ "names": names })))
                    .await?;
            }
            info!("Created repository");
        }

        let mut payload = body;
        if let (Some(names), Value::Object(map)) = (topics, &mut payload) {
            map.insert("topics".to_string(), names);
        }
        Ok(vec![ReconcileAction::create(
            REPOSITORY_SECTION,
            repo,
            payload,
        )
        .with_message("Create repository")])
    }
}

/// Whether the rest of a repository's settings should be processed.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveOutcome {
    pub should_continue: bool,
    pub actions: Vec<ReconcileAction>,
}

impl ArchiveOutcome {
    fn proceed() -> Self {
        Self {
            should_continue: true,
            actions: Vec::new(),
        }
    }
}

/// Decides what happens to archived (or to-be-archived) repositories.
///
/// | desired `archived` | live archived | outcome |
/// |---|---|---|
/// | `true` | no | archive, stop |
/// | `true` | yes | stop |
/// | `false` | yes | unarchive, continue |
/// | unset | yes | stop |
/// | anything | no | continue |
pub struct ArchiveGate<'a> {
    client: &'a dyn SettingsClient,
    nop: bool,
}

impl<'a> ArchiveGate<'a> {
    pub fn new(client: &'a dyn SettingsClient, nop: bool) -> Self {
        Self { client, nop }
    }

    #[instrument(skip(self, config), fields(owner = %owner, repo = %repo))]
    pub async fn check(
        &self,
        owner: &str,
        repo: &str,
        config: Option<&Value>,
    ) -> EngineResult<ArchiveOutcome> {
        let desired = config
            .and_then(|c| c.get("archived"))
            .and_then(Value::as_bool);

        let live_archived = match self.client.get_repository(owner, repo).await {
            Ok(live) => live.get("archived").and_then(Value::as_bool).unwrap_or(false),
            Err(GitHubError::NotFound) => return Ok(ArchiveOutcome::proceed()),
            Err(e) => return Err(e.into()),
        };

        match (desired, live_archived) {
            (Some(true), false) => {
                self.set_archived(owner, repo, true).await?;
                Ok(ArchiveOutcome {
                    should_continue: false,
                    actions: vec![ReconcileAction::update(
                        ARCHIVE_PLUGIN,
                        repo,
                        json!({ "archived": true }),
                    )
                    .with_message("Archive repository")],
                })
            }
            (Some(false), true) => {
                self.set_archived(owner, repo, false).await?;
                Ok(ArchiveOutcome {
                    should_continue: true,
                    actions: vec![ReconcileAction::update(
                        ARCHIVE_PLUGIN,
                        repo,
                        json!({ "archived": false }),
                    )
                    .with_message("Unarchive repository")],
                })
            }
            (_, true) => {
                debug!("Repository is archived, skipping");
                Ok(ArchiveOutcome {
                    should_continue: false,
                    actions: vec![ReconcileAction::noop(
                        ARCHIVE_PLUGIN,
                        repo,
                        json!({ "archived": true }),
                    )
                    .with_message("Repository is archived, skipping")],
                })
            }
            (_, false) => Ok(ArchiveOutcome::proceed()),
        }
    }

    async fn set_archived(&self, owner: &str, repo: &str, archived: bool) -> EngineResult<()> {
        if self.nop {
            return Ok(());
        }
        self.client
            .send(
                HttpMethod::Patch,
                &repo_path(owner, repo),
                Some(&json!({ "archived": archived })),
            )
            .await?;
        info!(archived, "Changed repository archive state");
        Ok(())
    }
}
