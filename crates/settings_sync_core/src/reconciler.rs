//! Generic desired-versus-live reconciliation.
//!
//! Every list-shaped resource section (labels, milestones, rulesets, ...) is
//! reconciled by the same algorithm:
//!
//! 1. each desired entity is matched to the live entity with the same
//!    identity key; no match means **create**;
//! 2. a match is compared field by field, looking only at the fields the
//!    desired entity declares; differing fields make an **update** carrying
//!    the identity key and those fields only, otherwise the entity is a
//!    **noop**;
//! 3. every live entity nobody matched is **deleted**.
//!
//! In dry-run mode the resulting actions are reported and nothing is sent.

use crate::{
    plugins::{ResourcePlugin, Target},
    EngineResult, ReconcileAction,
};
use github_client::SettingsClient;
use serde_json::{Map, Value};
use tracing::{debug, info};

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;

/// How entities of one resource type are identified and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    /// Field matching desired entities to live ones.
    pub key: &'static str,
    /// Field holding the remote id, when endpoints address entities by id.
    pub id_field: Option<&'static str>,
    /// When set, only these fields are ever compared.
    pub compared_fields: Option<&'static [&'static str]>,
}

impl EntitySchema {
    pub const fn keyed(key: &'static str) -> Self {
        Self {
            key,
            id_field: None,
            compared_fields: None,
        }
    }

    pub const fn with_id(mut self, id_field: &'static str) -> Self {
        self.id_field = Some(id_field);
        self
    }

    pub const fn comparing(mut self, fields: &'static [&'static str]) -> Self {
        self.compared_fields = Some(fields);
        self
    }

    pub fn identity<'v>(&self, entity: &'v Value) -> Option<&'v Value> {
        entity.get(self.key).filter(|v| !v.is_null())
    }

    /// The remote id of a live entity, falling back to its identity key.
    pub fn remote_id<'v>(&self, entity: &'v Value) -> Option<&'v Value> {
        match self.id_field {
            Some(field) => entity.get(field),
            None => self.identity(entity),
        }
    }

    fn is_compared(&self, field: &str) -> bool {
        field != self.key
            && Some(field) != self.id_field
            && self
                .compared_fields
                .map_or(true, |fields| fields.contains(&field))
    }
}

/// One step needed to bring live state to the desired state.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Create { desired: Value },
    /// `payload` holds the identity key and the changed fields only.
    Update {
        payload: Value,
        desired: Value,
        current: Value,
    },
    Delete { current: Value },
    Noop { desired: Value },
}

impl Change {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Noop { .. })
    }
}

/// Fields of `desired` whose value differs from `current`.
///
/// Fields the desired entity does not declare are never compared. A live
/// `null` and a missing live field are the same; a desired `null` against a
/// live value is a change.
pub fn changed_fields(schema: &EntitySchema, desired: &Value, current: &Value) -> Map<String, Value> {
    let mut changed = Map::new();
    if let Value::Object(fields) = desired {
        for (field, value) in fields {
            if !schema.is_compared(field) {
                continue;
            }
            let live = current.get(field).unwrap_or(&Value::Null);
            if !matches_live(value, live) {
                changed.insert(field.clone(), value.clone());
            }
        }
    }
    changed
}

/// Compares a desired value with its live counterpart.
///
/// Mappings compare only the keys the desired side declares; lists compare
/// element by element.
pub fn matches_live(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Null, live) => live.is_null(),
        (Value::Object(want), Value::Object(have)) => want
            .iter()
            .all(|(k, v)| matches_live(v, have.get(k).unwrap_or(&Value::Null))),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| matches_live(w, h))
        }
        (want, have) => want == have,
    }
}

/// Computes the changes turning `current` into `desired`.
///
/// Desired entities are handled in order, then deletions follow in live
/// order. When several live entities share a key the first one is used.
pub fn diff(schema: &EntitySchema, desired: &[Value], current: &[Value]) -> Vec<Change> {
    let mut matched = vec![false; current.len()];
    let mut changes = Vec::with_capacity(desired.len());

    for entity in desired {
        let position = schema.identity(entity).and_then(|identity| {
            current
                .iter()
                .position(|live| schema.identity(live) == Some(identity))
        });

        let Some(position) = position else {
            changes.push(Change::Create {
                desired: entity.clone(),
            });
            continue;
        };

        matched[position] = true;
        let live = &current[position];
        let fields = changed_fields(schema, entity, live);
        if fields.is_empty() {
            changes.push(Change::Noop {
                desired: entity.clone(),
            });
        } else {
            let mut payload = Map::new();
            if let Some(identity) = schema.identity(entity) {
                payload.insert(schema.key.to_string(), identity.clone());
            }
            payload.extend(fields);
            changes.push(Change::Update {
                payload: Value::Object(payload),
                desired: entity.clone(),
                current: live.clone(),
            });
        }
    }

    for (live, seen) in current.iter().zip(matched) {
        if !seen {
            changes.push(Change::Delete {
                current: live.clone(),
            });
        }
    }

    changes
}

/// Runs one resource plugin against one target.
pub struct Reconciler<'a> {
    plugin: &'a dyn ResourcePlugin,
    client: &'a dyn SettingsClient,
    nop: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(plugin: &'a dyn ResourcePlugin, client: &'a dyn SettingsClient, nop: bool) -> Self {
        Self { plugin, client, nop }
    }

    /// Reconciles the section value against live state.
    ///
    /// In dry-run mode the actions are returned without any mutation.
    ///
    /// # Errors
    ///
    /// Fails when the section has the wrong shape, when live state cannot be
    /// read, or (live mode only) when a mutation is rejected.
    pub async fn sync(&self, target: &Target, section: &Value) -> EngineResult<Vec<ReconcileAction>> {
        let name = self.plugin.name();
        let schema = self.plugin.schema();
        let desired = self.plugin.desired(target, section)?;
        let current = self.plugin.current(self.client, target).await?;

        let changes = diff(schema, &desired, &current);
        debug!(
            plugin = name,
            target = %target,
            desired = desired.len(),
            current = current.len(),
            changes = changes.iter().filter(|c| c.is_mutation()).count(),
            "Computed changes"
        );

        let mut actions = Vec::with_capacity(changes.len());
        for change in &changes {
            if change.is_mutation() && !self.nop {
                self.plugin.apply(self.client, target, change).await?;
            }
            actions.push(to_action(name, schema, target, change));
        }

        if !self.nop {
            info!(plugin = name, target = %target, "Synced resource section");
        }
        Ok(actions)
    }
}

fn to_action(plugin: &str, schema: &EntitySchema, target: &Target, change: &Change) -> ReconcileAction {
    let repo = target.display_name();
    match change {
        Change::Create { desired } => ReconcileAction::create(plugin, repo, desired.clone()),
        Change::Update {
            payload, current, ..
        } => {
            let mut payload = payload.clone();
            if let (Some(field), Some(id), Value::Object(map)) =
                (schema.id_field, schema.remote_id(current), &mut payload)
            {
                map.insert(field.to_string(), id.clone());
            }
            ReconcileAction::update(plugin, repo, payload)
        }
        Change::Delete { current } => {
            let mut payload = Map::new();
            if let Some(identity) = schema.identity(current) {
                payload.insert(schema.key.to_string(), identity.clone());
            }
            if let (Some(field), Some(id)) = (schema.id_field, schema.remote_id(current)) {
                payload.insert(field.to_string(), id.clone());
            }
            ReconcileAction::delete(plugin, repo, Value::Object(payload))
        }
        Change::Noop { desired } => ReconcileAction::noop(plugin, repo, desired.clone()),
    }
}
