//! Configuration management for the settings-sync CLI.
//!
//! The configuration is stored in TOML format. It holds the engine settings
//! (where the settings documents live in the admin repository) and the
//! authentication settings used to reach GitHub. Every field has a default,
//! so the file itself is optional.

use std::{
    fs,
    path::{Path, PathBuf},
};

use config_manager::EngineSettings;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Error;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILENAME: &str = "settings-sync.toml";

/// Environment variable holding a personal access token, unless configured otherwise
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Main configuration structure for the settings-sync CLI.
///
/// # Example TOML Configuration
///
/// ```toml
/// [engine]
/// admin_repo = "admin"
/// config_path = ".github"
/// settings_file = "settings.yml"
/// create_pr_comment = true
///
/// [authentication]
/// app_id = 12345
/// private_key_path = "/etc/settings-sync/app.pem"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub authentication: AuthenticationConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file at the specified path.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the file does not exist
    /// - `Error::LoadFile` if the file cannot be read
    /// - `Error::ParseTomlFile` if the content is not a valid configuration
    pub fn load(path: &Path) -> Result<Self, Error> {
        debug!("Loading configuration from {:?}", path);

        if !path.exists() {
            return Err(Error::Config(format!(
                "Configuration file not found: {:?}",
                path
            )));
        }

        let content = fs::read_to_string(path).map_err(Error::LoadFile)?;
        toml::from_str(&content).map_err(Error::ParseTomlFile)
    }

    /// Loads the configuration for a command invocation.
    ///
    /// An explicitly requested file must exist. Without one, the default file
    /// in the current directory is used when present, the defaults otherwise.
    pub fn resolve(config_path: Option<&str>) -> Result<Self, Error> {
        let path = get_config_path(config_path);
        if config_path.is_none() && !path.exists() {
            debug!("No configuration file found, using defaults");
            return Ok(Self::default());
        }
        Self::load(&path)
    }
}

/// How the CLI authenticates with GitHub.
///
/// When both `app_id` and `private_key_path` are set the CLI authenticates as
/// the GitHub App installed on the organization. Otherwise it uses the
/// personal access token found in the `token_env` environment variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationConfig {
    #[serde(default = "AuthenticationConfig::default_token_env")]
    pub token_env: String,

    #[serde(default)]
    pub app_id: Option<u64>,

    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
}

impl AuthenticationConfig {
    fn default_token_env() -> String {
        DEFAULT_TOKEN_ENV.to_string()
    }
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            token_env: Self::default_token_env(),
            app_id: None,
            private_key_path: None,
        }
    }
}

/// Resolves the path to the configuration file.
///
/// Uses `config_path` when given, `./settings-sync.toml` otherwise.
pub fn get_config_path(config_path: Option<&str>) -> PathBuf {
    if let Some(path) = config_path {
        PathBuf::from(path)
    } else {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        current_dir.join(DEFAULT_CONFIG_FILENAME)
    }
}
