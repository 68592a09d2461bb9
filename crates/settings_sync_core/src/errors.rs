//! Error types for the settings sync engine.

use config_manager::ConfigurationError;
use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors raised while syncing settings.
///
/// Configuration errors come from loading, resolving or validating the
/// settings documents. GitHub errors come from the remote API. Reconcile
/// errors describe a desired section the engine cannot act on.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("GitHub API error: {0}")]
    GitHub(#[from] github_client::Error),

    #[error("Failed to reconcile {plugin} for {repo}: {reason}")]
    Reconcile {
        plugin: String,
        repo: String,
        reason: String,
    },
}

impl EngineError {
    pub fn reconcile(
        plugin: impl Into<String>,
        repo: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Reconcile {
            plugin: plugin.into(),
            repo: repo.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that invalidate the whole run, not one repository.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Configuration(e) if e.is_structural())
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
