//! Configuration merging engine.
//!
//! This module implements the layered merge that turns the org settings file,
//! the matching sub-org document and the repo override document into the
//! effective configuration of one repository.
//!
//! # Configuration Hierarchy
//!
//! The merge follows a strict precedence order from lowest to highest:
//! 1. **Org** - the base value from the org settings file
//! 2. **Sub-org** - the overlay of the sub-org governing the repository
//! 3. **Repo** - the repository's own override document
//!
//! A layer that does not exist (or does not declare a section) is skipped.
//!
//! # Merge Rules
//!
//! - mappings merge key by key, recursively;
//! - lists of mappings merge element by element, matched on the section's
//!   merge key (`name` unless configured otherwise); list elements without
//!   the key match by position;
//! - lists of scalars are unioned, keeping the lower layer's order;
//! - everything else is replaced by the higher layer. An explicit `null`
//!   counts as a value and replaces the lower layer.
//!
//! # Examples
//!
//! ```rust
//! use config_manager::ConfigurationMerger;
//! use serde_json::json;
//!
//! let merger = ConfigurationMerger::new();
//! let org = json!([{ "name": "bug", "color": "CC0000" }]);
//! let repo = json!([{ "name": "bug", "color": "00FF00" }, { "name": "docs" }]);
//!
//! let merged = merger.merge_section("labels", &[Some(&org), None, Some(&repo)]);
//!
//! assert_eq!(
//!     merged,
//!     Some(json!([{ "name": "bug", "color": "00FF00" }, { "name": "docs" }]))
//! );
//! ```

use crate::documents::Sections;
use serde_json::Value;
use std::collections::HashMap;

#[cfg(test)]
#[path = "merger_tests.rs"]
mod tests;

/// Merge key used when a section has no explicit one.
pub const DEFAULT_MERGE_KEY: &str = "name";

/// Configuration merging engine.
///
/// Stateless apart from the per-section merge keys.
#[derive(Debug, Clone)]
pub struct ConfigurationMerger {
    merge_keys: HashMap<String, String>,
}

impl Default for ConfigurationMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationMerger {
    /// Creates a merger with the merge keys of the built-in resource sections.
    pub fn new() -> Self {
        Self {
            merge_keys: HashMap::new(),
        }
        .with_merge_key("milestones", "title")
        .with_merge_key("autolinks", "key_prefix")
    }

    /// Sets the identity field used to match list entries of `section`.
    pub fn with_merge_key(mut self, section: &str, key: &str) -> Self {
        self.merge_keys.insert(section.to_string(), key.to_string());
        self
    }

    pub fn merge_key(&self, section: &str) -> &str {
        self.merge_keys
            .get(section)
            .map(String::as_str)
            .unwrap_or(DEFAULT_MERGE_KEY)
    }

    /// Merges the layers of one section, lowest precedence first.
    ///
    /// Returns `None` when no layer declares the section.
    pub fn merge_section(&self, section: &str, layers: &[Option<&Value>]) -> Option<Value> {
        let key = self.merge_key(section);
        layers.iter().flatten().fold(None, |merged, layer| match merged {
            None => Some((*layer).clone()),
            Some(lower) => Some(merge_values(key, lower, layer)),
        })
    }

    /// Merges whole documents section by section, lowest precedence first.
    ///
    /// Sections come out sorted by name.
    pub fn merge_sections(&self, layers: &[Option<&Sections>]) -> Sections {
        let mut merged = Sections::new();
        for layer in layers.iter().flatten() {
            for (section, value) in layer.iter() {
                let combined = match merged.remove(section) {
                    Some(lower) => merge_values(self.merge_key(section), lower, value),
                    None => value.clone(),
                };
                merged.insert(section.clone(), combined);
            }
        }
        merged
    }

    /// Merges `overlay` on top of `base` using the merge key of `section`.
    pub fn merge_deep(&self, section: &str, base: &Value, overlay: &Value) -> Value {
        merge_values(self.merge_key(section), base.clone(), overlay)
    }
}

fn merge_values(key: &str, base: Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (field, value) in overlay {
                let merged = match base.remove(field) {
                    Some(lower) => merge_values(key, lower, value),
                    None => value.clone(),
                };
                base.insert(field.clone(), merged);
            }
            Value::Object(base)
        }
        (Value::Array(base), Value::Array(overlay)) => Value::Array(merge_lists(key, base, overlay)),
        (_, overlay) => overlay.clone(),
    }
}

fn merge_lists(key: &str, mut base: Vec<Value>, overlay: &[Value]) -> Vec<Value> {
    for (index, item) in overlay.iter().enumerate() {
        match item {
            Value::Object(fields) => {
                let position = match fields.get(key) {
                    Some(identity) => base
                        .iter()
                        .position(|b| b.get(key) == Some(identity)),
                    None => base
                        .get(index)
                        .filter(|b| b.is_object() && b.get(key).is_none())
                        .map(|_| index),
                };
                match position {
                    Some(position) => {
                        let lower = std::mem::take(&mut base[position]);
                        base[position] = merge_values(key, lower, item);
                    }
                    None => base.push(item.clone()),
                }
            }
            scalar => {
                if !base.contains(scalar) {
                    base.push(scalar.clone());
                }
            }
        }
    }
    base
}
