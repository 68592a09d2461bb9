//! Resource plugins: one per settings section the engine can enforce.
//!
//! A plugin knows three things about its resource type: how entities are
//! identified (its [`EntitySchema`]), how to read the live list, and which
//! endpoint each kind of [`Change`] is sent to. The diff itself lives in
//! [`crate::reconciler`].

use crate::{
    reconciler::{Change, EntitySchema},
    EngineError, EngineResult,
};
use async_trait::async_trait;
use futures::future::try_join_all;
use github_client::{encode_path_segment, HttpMethod, SettingsClient};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use tracing::debug;

#[cfg(test)]
#[path = "plugins_tests.rs"]
mod tests;

/// Level a resource lives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Repository,
    Organization,
}

/// The repository or organization a plugin runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Repository { owner: String, name: String },
    Organization { org: String },
}

impl Target {
    pub fn repository(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Repository {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn organization(org: impl Into<String>) -> Self {
        Self::Organization { org: org.into() }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Self::Repository { .. } => Scope::Repository,
            Self::Organization { .. } => Scope::Organization,
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            Self::Repository { owner, .. } => owner,
            Self::Organization { org } => org,
        }
    }

    /// Name used in results: the repository name, or the organization.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Repository { name, .. } => name,
            Self::Organization { org } => org,
        }
    }

    /// API prefix for resources under this target.
    pub fn base_path(&self) -> String {
        match self {
            Self::Repository { owner, name } => format!(
                "/repos/{}/{}",
                encode_path_segment(owner),
                encode_path_segment(name)
            ),
            Self::Organization { org } => format!("/orgs/{}", encode_path_segment(org)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository { owner, name } => write!(f, "{owner}/{name}"),
            Self::Organization { org } => write!(f, "{org}"),
        }
    }
}

/// A settings section the engine can reconcile.
#[async_trait]
pub trait ResourcePlugin: Send + Sync {
    /// Section name in the settings documents, e.g. `labels`.
    fn name(&self) -> &'static str;

    fn supports(&self, scope: Scope) -> bool;

    fn schema(&self) -> &EntitySchema;

    /// Turns the merged section value into the desired entity list.
    fn desired(&self, target: &Target, section: &Value) -> EngineResult<Vec<Value>>;

    /// Reads the live entity list.
    async fn current(
        &self,
        client: &dyn SettingsClient,
        target: &Target,
    ) -> EngineResult<Vec<Value>>;

    /// Sends one change.
    async fn apply(
        &self,
        client: &dyn SettingsClient,
        target: &Target,
        change: &Change,
    ) -> EngineResult<()>;
}

/// How a collection endpoint accepts writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStyle {
    /// POST to the collection, PATCH the entity with changed fields only.
    PostPatch,
    /// POST to the collection, PUT the whole desired entity.
    PostPut,
    /// PUT the whole desired entity for both create and update.
    PutByKey,
    /// No update endpoint: delete the live entity and create the desired one.
    Replace,
}

type Normalize = fn(Value) -> Value;

/// A list-shaped resource served by a REST collection endpoint.
pub struct CollectionPlugin {
    name: &'static str,
    scopes: &'static [Scope],
    schema: EntitySchema,
    collection: &'static str,
    list_query: Option<&'static str>,
    items_key: Option<&'static str>,
    write_style: WriteStyle,
    /// Fetch each entity by id after listing; list payloads are summaries.
    fetch_details: bool,
    /// Keep only live entities whose `source_type` is `Repository`.
    own_entities_only: bool,
    normalize_desired: Normalize,
    normalize_current: Normalize,
}

impl fmt::Debug for CollectionPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionPlugin")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("write_style", &self.write_style)
            .finish()
    }
}

fn unchanged(value: Value) -> Value {
    value
}

impl CollectionPlugin {
    fn new(name: &'static str, schema: EntitySchema, write_style: WriteStyle) -> Self {
        Self {
            name,
            scopes: &[Scope::Repository],
            schema,
            collection: name,
            list_query: None,
            items_key: None,
            write_style,
            fetch_details: false,
            own_entities_only: false,
            normalize_desired: unchanged,
            normalize_current: unchanged,
        }
    }

    pub fn labels() -> Self {
        Self {
            normalize_desired: normalize_label,
            normalize_current: normalize_label,
            ..Self::new("labels", EntitySchema::keyed("name"), WriteStyle::PostPatch)
        }
    }

    /// Milestones are matched by title and only description and state are
    /// compared.
    pub fn milestones() -> Self {
        Self {
            list_query: Some("state=all"),
            ..Self::new(
                "milestones",
                EntitySchema::keyed("title")
                    .with_id("number")
                    .comparing(&["description", "state"]),
                WriteStyle::PostPatch,
            )
        }
    }

    pub fn autolinks() -> Self {
        Self::new(
            "autolinks",
            EntitySchema::keyed("key_prefix").with_id("id"),
            WriteStyle::Replace,
        )
    }

    pub fn environments() -> Self {
        Self {
            items_key: Some("environments"),
            normalize_current: normalize_environment,
            ..Self::new(
                "environments",
                EntitySchema::keyed("name"),
                WriteStyle::PutByKey,
            )
        }
    }

    /// Rulesets at repository level; live rulesets inherited from the
    /// organization are ignored.
    pub fn rulesets() -> Self {
        Self {
            scopes: &[Scope::Repository, Scope::Organization],
            fetch_details: true,
            own_entities_only: true,
            ..Self::new(
                "rulesets",
                EntitySchema::keyed("name").with_id("id"),
                WriteStyle::PostPut,
            )
        }
    }

    fn collection_path(&self, target: &Target) -> String {
        format!("{}/{}", target.base_path(), self.collection)
    }

    fn entity_path(&self, target: &Target, id: &Value) -> String {
        format!(
            "{}/{}",
            self.collection_path(target),
            encode_path_segment(&segment(id))
        )
    }

    fn remote_id<'v>(&self, target: &Target, entity: &'v Value) -> EngineResult<&'v Value> {
        self.schema.remote_id(entity).ok_or_else(|| {
            EngineError::reconcile(
                self.name,
                target.display_name(),
                "live entity has no identifier",
            )
        })
    }

    fn key<'v>(&self, target: &Target, entity: &'v Value) -> EngineResult<&'v Value> {
        self.schema.identity(entity).ok_or_else(|| {
            EngineError::reconcile(
                self.name,
                target.display_name(),
                format!("entity is missing its '{}' field", self.schema.key),
            )
        })
    }

    async fn create(
        &self,
        client: &dyn SettingsClient,
        target: &Target,
        desired: &Value,
    ) -> EngineResult<()> {
        match self.write_style {
            WriteStyle::PutByKey => {
                let path = self.entity_path(target, self.key(target, desired)?);
                let body = without(desired, self.schema.key);
                client.send(HttpMethod::Put, &path, Some(&body)).await?;
            }
            _ => {
                client
                    .send(HttpMethod::Post, &self.collection_path(target), Some(desired))
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete(
        &self,
        client: &dyn SettingsClient,
        target: &Target,
        current: &Value,
    ) -> EngineResult<()> {
        let path = self.entity_path(target, self.remote_id(target, current)?);
        client.send(HttpMethod::Delete, &path, None).await?;
        Ok(())
    }
}

#[async_trait]
impl ResourcePlugin for CollectionPlugin {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    fn desired(&self, target: &Target, section: &Value) -> EngineResult<Vec<Value>> {
        let entries = match section {
            Value::Null => return Ok(Vec::new()),
            Value::Array(entries) => entries,
            _ => {
                return Err(EngineError::reconcile(
                    self.name,
                    target.display_name(),
                    "section must be a list",
                ))
            }
        };

        entries
            .iter()
            .map(|entry| {
                if entry.is_object() {
                    Ok((self.normalize_desired)(entry.clone()))
                } else {
                    Err(EngineError::reconcile(
                        self.name,
                        target.display_name(),
                        "list entries must be mappings",
                    ))
                }
            })
            .collect()
    }

    async fn current(
        &self,
        client: &dyn SettingsClient,
        target: &Target,
    ) -> EngineResult<Vec<Value>> {
        let mut path = self.collection_path(target);
        if let Some(query) = self.list_query {
            path = format!("{path}?{query}");
        }

        let mut live = client.list_resources(&path, self.items_key).await?;
        if self.own_entities_only && target.scope() == Scope::Repository {
            live.retain(|entity| {
                entity.get("source_type").and_then(Value::as_str) == Some("Repository")
            });
        }

        if self.fetch_details {
            let details = live
                .iter()
                .map(|summary| {
                    let id = self.remote_id(target, summary).map(|id| self.entity_path(target, id));
                    async move { Ok::<_, EngineError>(client.get_resource(&id?).await?) }
                })
                .collect::<Vec<_>>();
            live = try_join_all(details).await?;
        }

        debug!(plugin = self.name, target = %target, count = live.len(), "Read live state");
        Ok(live.into_iter().map(self.normalize_current).collect())
    }

    async fn apply(
        &self,
        client: &dyn SettingsClient,
        target: &Target,
        change: &Change,
    ) -> EngineResult<()> {
        match change {
            Change::Create { desired } => self.create(client, target, desired).await,
            Change::Delete { current } => self.delete(client, target, current).await,
            Change::Update {
                payload,
                desired,
                current,
            } => {
                match self.write_style {
                    WriteStyle::PostPatch => {
                        let path = self.entity_path(target, self.remote_id(target, current)?);
                        client.send(HttpMethod::Patch, &path, Some(payload)).await?;
                    }
                    WriteStyle::PostPut => {
                        let path = self.entity_path(target, self.remote_id(target, current)?);
                        client.send(HttpMethod::Put, &path, Some(desired)).await?;
                    }
                    WriteStyle::PutByKey => self.create(client, target, desired).await?,
                    WriteStyle::Replace => {
                        self.delete(client, target, current).await?;
                        self.create(client, target, desired).await?;
                    }
                }
                Ok(())
            }
            Change::Noop { .. } => Ok(()),
        }
    }
}

/// The set of resource plugins available to a run, looked up by section name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn ResourcePlugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.name()))
            .finish()
    }
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Labels, milestones, autolinks, environments and rulesets.
    pub fn builtin() -> Self {
        Self::empty()
            .with_plugin(Arc::new(CollectionPlugin::labels()))
            .with_plugin(Arc::new(CollectionPlugin::milestones()))
            .with_plugin(Arc::new(CollectionPlugin::autolinks()))
            .with_plugin(Arc::new(CollectionPlugin::environments()))
            .with_plugin(Arc::new(CollectionPlugin::rulesets()))
    }

    /// Adds a plugin, replacing any plugin registered under the same name.
    pub fn with_plugin(mut self, plugin: Arc<dyn ResourcePlugin>) -> Self {
        self.plugins.retain(|p| p.name() != plugin.name());
        self.plugins.push(plugin);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ResourcePlugin>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }
}

fn segment(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn without(entity: &Value, field: &str) -> Value {
    match entity {
        Value::Object(map) => {
            let mut map: Map<String, Value> = map.clone();
            map.remove(field);
            Value::Object(map)
        }
        other => other.clone(),
    }
}

/// Label colors are stored without `#` and in lower case.
fn normalize_label(mut label: Value) -> Value {
    if let Some(Value::String(color)) = label.get_mut("color") {
        *color = color.trim_start_matches('#').to_lowercase();
    }
    label
}

/// Flattens the live `protection_rules` list into the fields accepted when
/// writing an environment.
fn normalize_environment(environment: Value) -> Value {
    let Value::Object(mut map) = environment else {
        return environment;
    };

    if let Some(Value::Array(rules)) = map.remove("protection_rules") {
        for rule in rules {
            if let Some(wait_timer) = rule.get("wait_timer") {
                map.insert("wait_timer".to_string(), wait_timer.clone());
            }
            if let Some(prevent) = rule.get("prevent_self_review") {
                map.insert("prevent_self_review".to_string(), prevent.clone());
            }
            if let Some(Value::Array(reviewers)) = rule.get("reviewers") {
                let reviewers = reviewers
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "type": r.get("type").cloned().unwrap_or(Value::Null),
                            "id": r.pointer("/reviewer/id").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect();
                map.insert("reviewers".to_string(), Value::Array(reviewers));
            }
        }
    }
    Value::Object(map)
}
