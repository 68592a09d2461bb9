//! Configuration system error types.
//!
//! Domain-specific errors for loading, resolving, merging and validating
//! the layered settings documents stored in the admin repository.

use thiserror::Error;

// Reference the tests module in the separate file
#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Configuration system errors.
///
/// A missing configuration file is never an error: loaders report it as
/// "no configuration". Everything listed here is either a remote failure
/// other than not-found or an authoring mistake in the documents.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Failed to access configuration file: {path} - {reason}")]
    FileAccessError { path: String, reason: String },

    #[error("Failed to parse configuration: {path} - {reason}")]
    ParseError { path: String, reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Two sub-org documents claim the same repository key.
    #[error("Multiple suborg configs for {repository} in {first} and {second}")]
    SubOrgConflict {
        repository: String,
        first: String,
        second: String,
    },

    /// A config or override validator refused a section.
    #[error("Validation failed for {section}: {message}")]
    ValidationRejected { section: String, message: String },

    #[error("Unknown validator predicate '{name}' for {section}")]
    UnknownPredicate { section: String, name: String },

    /// The repo override directory has more entries than one tree response holds.
    #[error("Tree for {path} is truncated; not every override could be listed")]
    TruncatedTree { path: String },
}

impl ConfigurationError {
    /// Returns true for errors that must abort the whole run rather than one repository.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::SubOrgConflict { .. })
    }
}

/// Result type alias for configuration operations.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;
