//! Outcomes of reconciling one resource section.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[cfg(test)]
#[path = "results_tests.rs"]
mod tests;

/// Kind of change an action represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Noop,
    Error,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Noop => "NOOP",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Counts of entities touched by one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChangeCounts {
    pub additions: usize,
    pub deletions: usize,
    pub modifications: usize,
}

/// What an action adds, removes or modifies, as shown in reports.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionDetail {
    pub msg: String,
    pub additions: Option<Value>,
    pub deletions: Option<Value>,
    pub modifications: Option<Value>,
}

impl ActionDetail {
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            ..Self::default()
        }
    }

    /// True when the detail carries any change to report.
    pub fn has_changes(&self) -> bool {
        self.additions.is_some() || self.deletions.is_some() || self.modifications.is_some()
    }

    pub fn counts(&self) -> ChangeCounts {
        fn count(value: &Option<Value>) -> usize {
            match value {
                None => 0,
                Some(Value::Array(items)) => items.len(),
                Some(_) => 1,
            }
        }
        ChangeCounts {
            additions: count(&self.additions),
            deletions: count(&self.deletions),
            modifications: count(&self.modifications),
        }
    }
}

/// One action produced by a reconciler for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub plugin: String,
    pub repo: String,
    /// Identity key, changed fields and (for updates and deletes) the remote id.
    pub payload: Value,
    pub detail: ActionDetail,
}

impl ReconcileAction {
    pub fn create(plugin: &str, repo: &str, payload: Value) -> Self {
        Self {
            action_type: ActionType::Create,
            plugin: plugin.to_string(),
            repo: repo.to_string(),
            detail: ActionDetail {
                msg: format!("Create {plugin}"),
                additions: Some(payload.clone()),
                ..ActionDetail::default()
            },
            payload,
        }
    }

    pub fn update(plugin: &str, repo: &str, payload: Value) -> Self {
        Self {
            action_type: ActionType::Update,
            plugin: plugin.to_string(),
            repo: repo.to_string(),
            detail: ActionDetail {
                msg: format!("Update {plugin}"),
                modifications: Some(payload.clone()),
                ..ActionDetail::default()
            },
            payload,
        }
    }

    pub fn delete(plugin: &str, repo: &str, payload: Value) -> Self {
        Self {
            action_type: ActionType::Delete,
            plugin: plugin.to_string(),
            repo: repo.to_string(),
            detail: ActionDetail {
                msg: format!("Delete {plugin}"),
                deletions: Some(payload.clone()),
                ..ActionDetail::default()
            },
            payload,
        }
    }

    pub fn noop(plugin: &str, repo: &str, payload: Value) -> Self {
        Self {
            action_type: ActionType::Noop,
            plugin: plugin.to_string(),
            repo: repo.to_string(),
            detail: ActionDetail::message(format!("No change to {plugin}")),
            payload,
        }
    }

    pub fn error(plugin: &str, repo: &str, msg: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Error,
            plugin: plugin.to_string(),
            repo: repo.to_string(),
            payload: Value::Null,
            detail: ActionDetail::message(msg),
        }
    }

    /// Replaces the report message, keeping the change detail.
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.detail.msg = msg.into();
        self
    }
}

/// The record the aggregator keeps for an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    #[serde(rename = "type")]
    pub result_type: ActionType,
    pub repo: String,
    pub plugin: String,
    pub action: ActionDetail,
}

impl SyncResult {
    pub fn is_error(&self) -> bool {
        self.result_type == ActionType::Error
    }

    /// Identity used to drop repeated results in dry-run reports.
    pub fn dedup_key(&self) -> (ActionType, &str, &str) {
        (self.result_type, &self.repo, &self.plugin)
    }
}

impl From<ReconcileAction> for SyncResult {
    fn from(action: ReconcileAction) -> Self {
        Self {
            result_type: action.action_type,
            repo: action.repo,
            plugin: action.plugin,
            action: action.detail,
        }
    }
}

/// A run-level error, reported in the live-mode check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    pub owner: String,
    pub repo: String,
    pub msg: String,
    pub plugin: String,
}
