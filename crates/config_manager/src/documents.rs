//! Settings documents read from the admin repository.
//!
//! Three kinds of YAML document exist:
//!
//! - the org settings file ([`OrgConfig`]), holding the base value of every
//!   resource section plus the engine-level keys `restrictedRepos`,
//!   `configvalidators` and `overridevalidators`;
//! - sub-org documents ([`SubOrgConfig`]) under `suborgs/`, each selecting a
//!   set of repositories and overlaying sections for them;
//! - repo override documents ([`RepoOverride`]) under `repos/`, one per
//!   repository, named `<repo>.yml`.
//!
//! Section values are kept as `serde_json::Value` trees. Their shape belongs
//! to the resource plugin that consumes them.

use crate::{ConfigurationError, ConfigurationResult, RestrictedRepos, ValidatorSpec};
use serde_json::{Map, Value};

#[cfg(test)]
#[path = "documents_tests.rs"]
mod tests;

/// Resource sections of a document, keyed by section name.
pub type Sections = Map<String, Value>;

const RESTRICTED_REPOS_KEY: &str = "restrictedRepos";
const CONFIG_VALIDATORS_KEY: &str = "configvalidators";
const OVERRIDE_VALIDATORS_KEY: &str = "overridevalidators";

const SUBORG_REPOS_KEY: &str = "suborgrepos";
const SUBORG_TEAMS_KEY: &str = "suborgteams";
const SUBORG_PROPERTIES_KEY: &str = "suborgproperties";

/// Parses a YAML document into its top-level mapping.
///
/// An empty document yields an empty mapping.
///
/// # Errors
///
/// Returns `ParseError` for malformed YAML and `InvalidConfiguration` when
/// the document root is not a mapping.
pub fn parse_yaml(path: &str, text: &str) -> ConfigurationResult<Sections> {
    let value: Value = serde_yaml::from_str(text).map_err(|e| ConfigurationError::ParseError {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    match value {
        Value::Null => Ok(Sections::new()),
        Value::Object(map) => Ok(map),
        _ => Err(ConfigurationError::InvalidConfiguration {
            field: path.to_string(),
            reason: "document root must be a mapping".to_string(),
        }),
    }
}

/// The org-wide settings file.
#[derive(Debug, Clone, Default)]
pub struct OrgConfig {
    sections: Sections,
    restricted_repos: RestrictedRepos,
    config_validators: Vec<ValidatorSpec>,
    override_validators: Vec<ValidatorSpec>,
}

impl OrgConfig {
    /// Parses the org settings file.
    pub fn from_yaml(path: &str, text: &str) -> ConfigurationResult<Self> {
        Self::from_sections(parse_yaml(path, text)?)
    }

    /// Builds the org config from an already parsed mapping, lifting the
    /// engine-level keys out of the resource sections.
    pub fn from_sections(mut sections: Sections) -> ConfigurationResult<Self> {
        let restricted_repos =
            RestrictedRepos::from_value(sections.remove(RESTRICTED_REPOS_KEY).as_ref())?;
        let config_validators =
            validator_specs(CONFIG_VALIDATORS_KEY, sections.remove(CONFIG_VALIDATORS_KEY))?;
        let override_validators =
            validator_specs(OVERRIDE_VALIDATORS_KEY, sections.remove(OVERRIDE_VALIDATORS_KEY))?;

        Ok(Self {
            sections,
            restricted_repos,
            config_validators,
            override_validators,
        })
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    pub fn restricted_repos(&self) -> &RestrictedRepos {
        &self.restricted_repos
    }

    pub fn config_validators(&self) -> &[ValidatorSpec] {
        &self.config_validators
    }

    pub fn override_validators(&self) -> &[ValidatorSpec] {
        &self.override_validators
    }
}

/// A custom property selector from `suborgproperties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyQuery {
    pub name: String,
    pub value: String,
}

/// A sub-org overlay document.
#[derive(Debug, Clone, PartialEq)]
pub struct SubOrgConfig {
    /// Path of the document in the admin repository.
    source: String,
    repos: Vec<String>,
    teams: Vec<String>,
    properties: Vec<PropertyQuery>,
    sections: Sections,
}

impl SubOrgConfig {
    pub fn from_yaml(source: &str, text: &str) -> ConfigurationResult<Self> {
        Self::from_sections(source, parse_yaml(source, text)?)
    }

    /// Splits a parsed sub-org document into its membership rules and the
    /// sections it overlays.
    pub fn from_sections(source: &str, mut sections: Sections) -> ConfigurationResult<Self> {
        let repos = string_list(source, SUBORG_REPOS_KEY, sections.remove(SUBORG_REPOS_KEY))?;
        let teams = string_list(source, SUBORG_TEAMS_KEY, sections.remove(SUBORG_TEAMS_KEY))?;
        let properties = property_queries(source, sections.remove(SUBORG_PROPERTIES_KEY))?;

        Ok(Self {
            source: source.to_string(),
            repos,
            teams,
            properties,
            sections,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Explicit repository names and glob patterns.
    pub fn repos(&self) -> &[String] {
        &self.repos
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn properties(&self) -> &[PropertyQuery] {
        &self.properties
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }
}

/// A per-repository override document.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoOverride {
    /// Repository name taken from the file stem.
    name: String,
    source: String,
    sections: Sections,
}

impl RepoOverride {
    pub fn from_yaml(name: &str, source: &str, text: &str) -> ConfigurationResult<Self> {
        Ok(Self::new(name, source, parse_yaml(source, text)?))
    }

    pub fn new(name: &str, source: &str, sections: Sections) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            sections,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    /// The repository this document describes: `repository.name` when the
    /// document declares one, otherwise the file stem.
    pub fn repository_name(&self) -> &str {
        self.sections
            .get("repository")
            .and_then(|r| r.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(&self.name)
    }

    /// The owning organization declared by `repository.organization`, if any.
    pub fn repository_owner(&self) -> Option<&str> {
        self.sections
            .get("repository")
            .and_then(|r| r.get("organization"))
            .and_then(Value::as_str)
    }
}

/// Renders a YAML scalar the way it is written in a property query.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_list(source: &str, key: &str, value: Option<Value>) -> ConfigurationResult<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.iter().map(scalar_to_string).collect()),
        Some(_) => Err(ConfigurationError::InvalidConfiguration {
            field: format!("{source}: {key}"),
            reason: "expected a list".to_string(),
        }),
    }
}

fn property_queries(source: &str, value: Option<Value>) -> ConfigurationResult<Vec<PropertyQuery>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ConfigurationError::InvalidConfiguration {
                field: format!("{source}: {SUBORG_PROPERTIES_KEY}"),
                reason: "expected a list of property mappings".to_string(),
            })
        }
    };

    let mut queries = Vec::new();
    for item in items {
        let Value::Object(map) = item else {
            return Err(ConfigurationError::InvalidConfiguration {
                field: format!("{source}: {SUBORG_PROPERTIES_KEY}"),
                reason: format!("expected a property mapping, found {item}"),
            });
        };
        for (name, value) in map {
            queries.push(PropertyQuery {
                name,
                value: scalar_to_string(&value),
            });
        }
    }
    Ok(queries)
}

fn validator_specs(key: &str, value: Option<Value>) -> ConfigurationResult<Vec<ValidatorSpec>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| ConfigurationError::InvalidConfiguration {
                field: key.to_string(),
                reason: e.to_string(),
            })
        }
    }
}
