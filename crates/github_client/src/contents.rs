//! Repository contents domain types.
//!
//! This module contains types for working with GitHub repository contents:
//! directory listings from the Contents API, decoded file bodies, and the
//! non-recursive git tree listing used for large configuration directories.

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "contents_tests.rs"]
mod tests;

/// A single entry in a GitHub repository directory listing.
///
/// Represents files, directories, symlinks, and submodules returned by
/// the GitHub Contents API when the requested path is a directory.
///
/// # Examples
///
/// ```rust
/// use github_client::{TreeEntry, EntryType};
///
/// let entry = TreeEntry {
///     name: "frontend.yml".to_string(),
///     path: ".github/suborgs/frontend.yml".to_string(),
///     entry_type: EntryType::File,
///     sha: "abc123".to_string(),
///     size: 120,
/// };
///
/// assert!(entry.is_file());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Entry name (e.g., "repos", "frontend.yml")
    pub name: String,

    /// Full path within repository (e.g., ".github/suborgs/frontend.yml")
    pub path: String,

    /// Entry type (file, directory, symlink, submodule)
    #[serde(rename = "type")]
    pub entry_type: EntryType,

    /// Git SHA of the entry
    pub sha: String,

    /// Size in bytes (0 for directories)
    #[serde(default)]
    pub size: u64,
}

impl TreeEntry {
    /// Returns true when the entry is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self.entry_type, EntryType::File)
    }

    /// Returns true when the entry is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self.entry_type, EntryType::Dir)
    }
}

/// Type of entry in a repository directory.
///
/// Maps to GitHub's content type field in the Contents API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Regular file
    File,

    /// Directory (can contain other entries)
    Dir,

    /// Symbolic link
    Symlink,

    /// Git submodule reference
    Submodule,
}

/// The decoded result of a Contents API request.
///
/// The same endpoint answers with a file body, a directory listing, or a
/// descriptor for content the client does not read (symlinks, submodules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// A regular file, base64-decoded into UTF-8 text.
    File(String),

    /// The path is a directory; its entries in API order.
    Directory(Vec<TreeEntry>),

    /// A symlink or submodule. No text is available.
    Unsupported,
}

/// A single entry of a git tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitTreeItem {
    /// Path of the entry relative to the tree root.
    pub path: String,

    /// Git SHA of the blob or sub-tree.
    pub sha: String,
}

/// A git tree listing as returned by `GET /repos/{owner}/{repo}/git/trees/{sha}`.
///
/// The Contents API stops at 1000 entries; the tree API does not, but it may
/// report `truncated` when the tree is too large to return in one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitTree {
    /// SHA of the tree itself.
    #[serde(default)]
    pub sha: String,

    /// Entries of the tree.
    #[serde(default, rename = "tree")]
    pub entries: Vec<GitTreeItem>,

    /// Whether GitHub cut the listing short.
    #[serde(default)]
    pub truncated: bool,
}
