//! # Models
//!
//! This module contains the data models exchanged with the GitHub API by the
//! settings sync engine: installations, repositories, and the check-run
//! payloads used to report the outcome of a run.
//!
//! Resource entities reconciled by the engine (labels, milestones, rulesets,
//! ...) are deliberately not modelled here. They travel as `serde_json::Value`
//! so that each resource section keeps whatever shape its YAML declares.

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;

/// Represents a GitHub account (user or organization).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    /// The unique ID of the account
    pub id: u64,
    /// The login name of the account
    pub login: String,
    /// The type of account (User or Organization)
    #[serde(rename = "type")]
    pub account_type: String,
    /// The node ID for GraphQL operations
    pub node_id: String,
}

/// Represents a GitHub App installation.
///
/// This struct contains information about where a GitHub App is installed,
/// such as an organization or user account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Installation {
    /// The unique ID of the installation
    pub id: u64,
    /// The account (user or organization) where the app is installed
    pub account: Account,
    /// Optional repository selection details
    pub repository_selection: Option<String>,
    /// The node ID for GraphQL operations
    pub node_id: String,
}

impl From<octocrab::models::Installation> for Installation {
    fn from(value: octocrab::models::Installation) -> Self {
        let account_node_id = value.account.node_id.clone();
        Self {
            id: *value.id,
            account: Account {
                id: *value.account.id,
                login: value.account.login,
                account_type: value.account.r#type,
                node_id: value.account.node_id,
            },
            repository_selection: value.repository_selection,
            node_id: account_node_id, // Use account's node_id since installation doesn't have one
        }
    }
}

/// The owner reference embedded in repository payloads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct RepositoryOwner {
    /// The login name of the owning user or organization
    pub login: String,
}

/// Represents a GitHub repository as listed by installation, team, and
/// search endpoints.
///
/// # Examples
///
/// ```rust
/// use github_client::models::Repository;
///
/// let repo = Repository::new("my-org", "my-repo");
///
/// assert_eq!(repo.owner_login(), "my-org");
/// assert_eq!(repo.name, "my-repo");
/// assert!(!repo.archived);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Repository {
    /// The name of the repository (without owner)
    pub name: String,

    /// The owner of the repository
    #[serde(default)]
    pub owner: RepositoryOwner,

    /// Whether the repository is archived
    #[serde(default)]
    pub archived: bool,
}

impl Repository {
    /// Creates a new, non-archived repository reference.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: RepositoryOwner {
                login: owner.into(),
            },
            archived: false,
        }
    }

    /// Returns the login of the repository owner.
    pub fn owner_login(&self) -> &str {
        &self.owner.login
    }

    /// Returns the `owner/name` form of the repository.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner.login, self.name)
    }
}

/// HTTP verbs used for resource mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Post,
    Patch,
    Put,
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Post => write!(f, "POST"),
            Self::Patch => write!(f, "PATCH"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Final conclusion of a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    Success,
    Failure,
}

/// The `output` block of a check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunOutput {
    pub title: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Payload used both to create and to complete a check run.
///
/// `name` and `head_sha` are only sent on creation; updates of an existing
/// check run leave them unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,

    /// Always `completed` for runs written by the engine.
    pub status: String,

    pub conclusion: CheckConclusion,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,

    pub output: CheckRunOutput,
}
