use std::io;

use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors that can occur in the settings-sync CLI application.
#[derive(Error, Debug)]
pub enum Error {
    /// Authentication with GitHub failed.
    ///
    /// Returned when no credentials are configured, or when the token or
    /// GitHub App credentials are rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The application configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to load a file from the filesystem.
    #[error("Failed to load file.")]
    LoadFile(io::Error),

    /// Failed to parse a TOML configuration file.
    #[error("Failed to parse TOML configuration file.")]
    ParseTomlFile(toml::de::Error),

    /// The sync run finished with errors.
    #[error("Settings sync failed: {0}")]
    Engine(String),
}
