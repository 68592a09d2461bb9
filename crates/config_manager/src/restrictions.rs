//! Repository restriction policy.
//!
//! `restrictedRepos` in the org settings file decides which repositories the
//! engine never touches. Three shapes are accepted:
//!
//! ```yaml
//! # Legacy: exact names that are excluded
//! restrictedRepos: [admin, .github]
//!
//! # Only repositories matching one of these patterns are processed
//! restrictedRepos:
//!   include: ['^team-']
//!
//! # Repositories matching one of these patterns are skipped
//! restrictedRepos:
//!   exclude: ['^archive-', 'sandbox']
//! ```
//!
//! Patterns are unanchored regular expressions tested against the bare
//! repository name.

use crate::{ConfigurationError, ConfigurationResult};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
#[path = "restrictions_tests.rs"]
mod tests;

/// Compiled form of the `restrictedRepos` setting.
#[derive(Debug, Clone, Default)]
pub enum RestrictedRepos {
    /// No restriction configured; every repository is processed.
    #[default]
    None,
    /// Exact repository names that are skipped.
    Legacy(Vec<String>),
    /// Only repositories matching one of the patterns are processed.
    Include(Vec<Regex>),
    /// Repositories matching one of the patterns are skipped.
    Exclude(Vec<Regex>),
}

impl RestrictedRepos {
    /// Builds the policy from the raw `restrictedRepos` value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when the value has an unknown shape or a
    /// pattern is not a valid regular expression.
    pub fn from_value(value: Option<&Value>) -> ConfigurationResult<Self> {
        let value = match value {
            None | Some(Value::Null) => return Ok(Self::None),
            Some(value) => value,
        };

        if let Value::Array(items) = value {
            return Ok(Self::Legacy(string_list(items)?));
        }

        if let Value::Object(map) = value {
            if let Some(Value::Array(items)) = map.get("include") {
                return Ok(Self::Include(compile(items)?));
            }
            if let Some(Value::Array(items)) = map.get("exclude") {
                return Ok(Self::Exclude(compile(items)?));
            }
            return Ok(Self::None);
        }

        Err(ConfigurationError::InvalidConfiguration {
            field: "restrictedRepos".to_string(),
            reason: "expected a list or an include/exclude mapping".to_string(),
        })
    }

    /// Returns true when `repo_name` must be skipped.
    pub fn is_restricted(&self, repo_name: &str) -> bool {
        match self {
            Self::None => false,
            Self::Legacy(names) => {
                let restricted = names.iter().any(|n| n == repo_name);
                if restricted {
                    debug!(repo = repo_name, "Skipping restricted repo");
                }
                restricted
            }
            Self::Include(patterns) => {
                let allowed = patterns.iter().any(|p| p.is_match(repo_name));
                if !allowed {
                    debug!(repo = repo_name, "Skipping repo not in restrictedRepos.include");
                }
                !allowed
            }
            Self::Exclude(patterns) => {
                let excluded = patterns.iter().any(|p| p.is_match(repo_name));
                if excluded {
                    debug!(repo = repo_name, "Skipping excluded repo in restrictedRepos.exclude");
                }
                excluded
            }
        }
    }
}

fn string_list(items: &[Value]) -> ConfigurationResult<Vec<String>> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(ConfigurationError::InvalidConfiguration {
                field: "restrictedRepos".to_string(),
                reason: format!("expected a repository name, found {other}"),
            }),
        })
        .collect()
}

fn compile(items: &[Value]) -> ConfigurationResult<Vec<Regex>> {
    string_list(items)?
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| ConfigurationError::InvalidConfiguration {
                field: "restrictedRepos".to_string(),
                reason: format!("invalid pattern '{pattern}': {e}"),
            })
        })
        .collect()
}
