//! # Settings Sync Core
//!
//! The engine that keeps the repositories of a GitHub organization in line
//! with the settings documents kept in its admin repository.
//!
//! ## Overview
//!
//! A run goes through the same steps whatever triggered it:
//! 1. Load the org settings, sub-org documents and repository overrides
//! 2. Compute the effective configuration of every repository in scope
//! 3. Validate the effective sections against the configured validators
//! 4. Reconcile each section with the live state through its plugin
//! 5. Report the outcome as a check run (and, for dry runs, a PR comment)
//!
//! ## Main Types
//!
//! - [`SettingsSync`] - Entry points for fleet, single repository and sub-org runs
//! - [`RunContext`] - Owner, ref and dry-run flag of a run
//! - [`PluginRegistry`] / [`ResourcePlugin`] - The section handlers
//! - [`Reconciler`] - Generic desired-vs-live diff for list-shaped sections
//! - [`ResultAggregator`] - Result buffering, deduplication and reporting
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use config_manager::EngineSettings;
//! use github_client::{create_token_client, GitHubClient};
//! use settings_sync_core::{RunContext, SettingsSync};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let octocrab = create_token_client("ghs_token")?;
//! let client = Arc::new(GitHubClient::new(octocrab));
//! let engine = SettingsSync::new(client, EngineSettings::default());
//!
//! let summary = engine.sync_all(&RunContext::new("my-org").dry_run()).await;
//! println!("{}", summary.report);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod errors;
pub mod plugins;
pub mod reconciler;
pub mod repository;
pub mod results;
pub mod sync;

pub use aggregator::{
    render_comment, render_errors, render_report, truncate_report, CheckRunTarget,
    ResultAggregator, RunStats, RunSummary, CHECK_RUN_NAME, REPORT_LIMIT, TRUNCATION_SUFFIX,
};
pub use errors::{EngineError, EngineResult};
pub use plugins::{CollectionPlugin, PluginRegistry, ResourcePlugin, Scope, Target, WriteStyle};
pub use reconciler::{changed_fields, diff, matches_live, Change, EntitySchema, Reconciler};
pub use repository::{ArchiveGate, ArchiveOutcome, RepositoryPlugin, ARCHIVE_PLUGIN, REPOSITORY_SECTION};
pub use results::{ActionDetail, ActionType, ChangeCounts, ReconcileAction, RunError, SyncResult};
pub use sync::{RunContext, SettingsSync, DRIVER_PLUGIN};
