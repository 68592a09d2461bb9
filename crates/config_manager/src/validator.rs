//! Section validators.
//!
//! The org settings file can guard resource sections with two kinds of
//! validator:
//!
//! - **config validators** decide whether the effective value of a section is
//!   acceptable at all;
//! - **override validators** decide whether a sub-org or repo override may
//!   replace the org base value, given both.
//!
//! Each validator names a predicate by its `script` key. Predicates are host
//! functions registered in a [`PredicateCatalog`]; nothing is compiled from
//! the document text.
//!
//! # Examples
//!
//! ```rust
//! use config_manager::{PredicateCatalog, ValidationContext, ValidatorRegistry, ValidatorSpec};
//! use serde_json::json;
//!
//! let specs = vec![ValidatorSpec {
//!     plugin: "branches".to_string(),
//!     script: "unchanged".to_string(),
//!     error: "Branch protection cannot be overridden".to_string(),
//! }];
//! let registry = ValidatorRegistry::compile(&[], &specs, &PredicateCatalog::builtin()).unwrap();
//! let ctx = ValidationContext::new("my-org", "my-repo", "branches");
//!
//! let base = json!({ "name": "main", "required_approving_review_count": 2 });
//! assert!(registry.validate_override(&base, &base, &ctx).is_ok());
//!
//! let lowered = json!({ "name": "main", "required_approving_review_count": 0 });
//! assert!(registry.validate_override(&base, &lowered, &ctx).is_err());
//! ```

use crate::{ConfigurationError, ConfigurationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

/// One entry of `configvalidators` or `overridevalidators`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSpec {
    /// Section the validator guards.
    pub plugin: String,
    /// Name of the predicate in the catalog.
    pub script: String,
    /// Message reported when the predicate rejects the section.
    #[serde(default)]
    pub error: String,
}

/// Read-only facts handed to predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext<'a> {
    pub org: &'a str,
    pub repo: &'a str,
    pub section: &'a str,
}

impl<'a> ValidationContext<'a> {
    pub fn new(org: &'a str, repo: &'a str, section: &'a str) -> Self {
        Self { org, repo, section }
    }
}

/// Predicate over the effective value of a section.
pub type ConfigPredicate = Arc<dyn Fn(&Value, &ValidationContext<'_>) -> bool + Send + Sync>;

/// Predicate over `(base, override)` for a section.
pub type OverridePredicate =
    Arc<dyn Fn(&Value, &Value, &ValidationContext<'_>) -> bool + Send + Sync>;

/// Named predicates that validator specs can refer to.
#[derive(Clone, Default)]
pub struct PredicateCatalog {
    config: HashMap<String, ConfigPredicate>,
    overrides: HashMap<String, OverridePredicate>,
}

impl std::fmt::Debug for PredicateCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut config: Vec<_> = self.config.keys().collect();
        let mut overrides: Vec<_> = self.overrides.keys().collect();
        config.sort();
        overrides.sort();
        f.debug_struct("PredicateCatalog")
            .field("config", &config)
            .field("overrides", &overrides)
            .finish()
    }
}

impl PredicateCatalog {
    /// A catalog with no predicates.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in predicates.
    ///
    /// Config predicates: `allow`, `deny`, `non_empty`.
    /// Override predicates: `allow`, `deny`, `non_empty` (on the override),
    /// `unchanged`, `no_removals`, `no_additions`.
    pub fn builtin() -> Self {
        Self::empty()
            .with_config("allow", |_, _| true)
            .with_config("deny", |_, _| false)
            .with_config("non_empty", |value, _| !is_empty(value))
            .with_override("allow", |_, _, _| true)
            .with_override("deny", |_, _, _| false)
            .with_override("non_empty", |_, value, _| !is_empty(value))
            .with_override("unchanged", |base, value, _| base == value)
            .with_override("no_removals", |base, value, _| contains_all(value, base))
            .with_override("no_additions", |base, value, _| contains_all(base, value))
    }

    /// Registers a config predicate, replacing any with the same name.
    pub fn with_config<F>(mut self, name: &str, predicate: F) -> Self
    where
        F: Fn(&Value, &ValidationContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.config.insert(name.to_string(), Arc::new(predicate));
        self
    }

    /// Registers an override predicate, replacing any with the same name.
    pub fn with_override<F>(mut self, name: &str, predicate: F) -> Self
    where
        F: Fn(&Value, &Value, &ValidationContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.overrides.insert(name.to_string(), Arc::new(predicate));
        self
    }
}

#[derive(Clone)]
struct Compiled<P> {
    predicate: P,
    error: String,
}

/// Validators compiled from the org settings, keyed by section.
///
/// When several specs name the same section the last one wins.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    config: HashMap<String, Compiled<ConfigPredicate>>,
    overrides: HashMap<String, Compiled<OverridePredicate>>,
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("config_sections", &self.config.keys().collect::<Vec<_>>())
            .field("override_sections", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ValidatorRegistry {
    /// Resolves every spec against the catalog.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPredicate` when a spec names a predicate the catalog
    /// does not have.
    pub fn compile(
        config_specs: &[ValidatorSpec],
        override_specs: &[ValidatorSpec],
        catalog: &PredicateCatalog,
    ) -> ConfigurationResult<Self> {
        let mut registry = Self::default();

        for spec in config_specs {
            let predicate = catalog.config.get(&spec.script).cloned().ok_or_else(|| {
                ConfigurationError::UnknownPredicate {
                    section: spec.plugin.clone(),
                    name: spec.script.clone(),
                }
            })?;
            registry.config.insert(
                spec.plugin.clone(),
                Compiled {
                    predicate,
                    error: spec.error.clone(),
                },
            );
        }

        for spec in override_specs {
            let predicate = catalog.overrides.get(&spec.script).cloned().ok_or_else(|| {
                ConfigurationError::UnknownPredicate {
                    section: spec.plugin.clone(),
                    name: spec.script.clone(),
                }
            })?;
            registry.overrides.insert(
                spec.plugin.clone(),
                Compiled {
                    predicate,
                    error: spec.error.clone(),
                },
            );
        }

        Ok(registry)
    }

    pub fn is_empty(&self) -> bool {
        self.config.is_empty() && self.overrides.is_empty()
    }

    /// Runs the config validator of `ctx.section`, if one is registered.
    pub fn validate_config(&self, value: &Value, ctx: &ValidationContext<'_>) -> ConfigurationResult<()> {
        let Some(validator) = self.config.get(ctx.section) else {
            return Ok(());
        };
        debug!(section = ctx.section, repo = ctx.repo, "Calling config validator");
        if (validator.predicate)(value, ctx) {
            return Ok(());
        }
        error!(
            section = ctx.section,
            repo = ctx.repo,
            message = %validator.error,
            "Config validator rejected section"
        );
        Err(ConfigurationError::ValidationRejected {
            section: ctx.section.to_string(),
            message: validator.error.clone(),
        })
    }

    /// Runs the override validator of `ctx.section`, if one is registered.
    pub fn validate_override(
        &self,
        base: &Value,
        value: &Value,
        ctx: &ValidationContext<'_>,
    ) -> ConfigurationResult<()> {
        let Some(validator) = self.overrides.get(ctx.section) else {
            return Ok(());
        };
        debug!(section = ctx.section, repo = ctx.repo, "Calling override validator");
        if (validator.predicate)(base, value, ctx) {
            return Ok(());
        }
        error!(
            section = ctx.section,
            repo = ctx.repo,
            message = %validator.error,
            "Override validator rejected section"
        );
        Err(ConfigurationError::ValidationRejected {
            section: ctx.section.to_string(),
            message: validator.error.clone(),
        })
    }

    /// Runs both validators of a section against its base and effective value.
    ///
    /// When both are lists, the override validator runs once per base entry
    /// against the effective entry with the same `name` (or `null` when the
    /// entry is gone).
    pub fn validate(
        &self,
        base: Option<&Value>,
        value: &Value,
        ctx: &ValidationContext<'_>,
    ) -> ConfigurationResult<()> {
        self.validate_config(value, ctx)?;

        let base = base.unwrap_or(&Value::Null);
        match (base, value) {
            (Value::Array(base_entries), Value::Array(entries)) => {
                for base_entry in base_entries {
                    let name = base_entry.get("name");
                    let entry = entries
                        .iter()
                        .find(|e| e.get("name") == name)
                        .unwrap_or(&Value::Null);
                    self.validate_override(base_entry, entry, ctx)?;
                }
                Ok(())
            }
            _ => self.validate_override(base, value, ctx),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// True when every element of `subset` is present in `superset`.
///
/// List elements with a `name` are matched by name, others by equality.
/// Mappings are compared by key.
fn contains_all(superset: &Value, subset: &Value) -> bool {
    match (superset, subset) {
        (_, Value::Null) => true,
        (Value::Array(outer), Value::Array(inner)) => inner.iter().all(|item| match item.get("name") {
            Some(name) => outer.iter().any(|o| o.get("name") == Some(name)),
            None => outer.contains(item),
        }),
        (Value::Object(outer), Value::Object(inner)) => {
            inner.keys().all(|k| outer.contains_key(k))
        }
        (Value::Null, _) => false,
        (outer, inner) => outer == inner,
    }
}
