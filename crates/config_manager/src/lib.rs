//! Configuration management for settings sync.
//!
//! This crate turns the settings documents of an organization's admin
//! repository into the effective configuration of each repository:
//!
//! - [`ConfigStore`] / [`GitHubConfigStore`] load the org settings file, the
//!   sub-org documents and the repo override documents;
//! - [`SubOrgResolver`] decides which sub-org governs which repository;
//! - [`ConfigurationMerger`] deep-merges org, sub-org and repo layers;
//! - [`ValidatorRegistry`] guards sections with config and override
//!   validators compiled from the org settings;
//! - [`RestrictedRepos`] decides which repositories are never touched.

pub mod config_store;
pub mod documents;
pub mod errors;
pub mod merger;
pub mod restrictions;
pub mod suborg;
pub mod validator;

pub use config_store::{ConfigStore, EngineSettings, GitHubConfigStore, OverrideFilter};
pub use documents::{OrgConfig, PropertyQuery, RepoOverride, Sections, SubOrgConfig};
pub use errors::{ConfigurationError, ConfigurationResult};
pub use merger::ConfigurationMerger;
pub use restrictions::RestrictedRepos;
pub use suborg::{SubOrgMap, SubOrgResolver};
pub use validator::{
    ConfigPredicate, OverridePredicate, PredicateCatalog, ValidationContext, ValidatorRegistry,
    ValidatorSpec,
};
