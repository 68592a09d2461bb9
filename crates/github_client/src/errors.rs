//! Error types for GitHub client operations.
//!
//! This module defines the error types that can occur when interacting with the GitHub API
//! through the github_client crate.

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors that can occur during GitHub client operations.
///
/// A `404` is always reported as [`Error::NotFound`] so that callers can treat
/// missing configuration files and missing repositories as "absent" rather
/// than as failures.
///
/// ## Examples
///
/// ```rust,ignore
/// use github_client::Error;
///
/// match client.get_repository("my-org", "my-repo").await {
///     Ok(repo) => println!("{}", repo["name"]),
///     Err(Error::NotFound) => println!("repository does not exist yet"),
///     Err(err) => eprintln!("Other error: {}", err),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A generic API request failure.
    #[error("API request failed")]
    ApiError(),

    /// Authentication or GitHub client initialization failure.
    ///
    /// The contained string provides specific details about the authentication failure.
    #[error("Failed to authenticate or initialize GitHub client: {0}")]
    AuthError(String),

    /// Error deserializing the response from GitHub.
    #[error("Failed to deserialize GitHub response: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The GitHub API returned a response in an unexpected format.
    #[error("Invalid response format")]
    InvalidResponse,

    /// The requested resource was not found.
    ///
    /// This error occurs when a GitHub API request returns a 404 status code,
    /// indicating that the requested resource (repository, file, directory, etc.)
    /// does not exist or is not accessible with the current authentication.
    #[error("Resource not found")]
    NotFound,

    /// GitHub API rate limit has been exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// GitHub rejected the request with a non-success status.
    #[error("GitHub returned {status}: {message}")]
    Status { status: u16, message: String },
}

impl Error {
    /// Returns true when the error means the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
