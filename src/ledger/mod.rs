//! Remote ledger abstraction
//!
//! A ledger is the remote repository the engine publishes into: an object
//! store (blobs, trees, commits) plus one mutable branch pointer that only
//! moves through compare-and-swap.

mod github;
mod simulated;

pub use github::{DEFAULT_API_URL, GitHubLedger, GitHubLedgerConfig};
pub use simulated::{CommitRecord, FOREIGN_COMMIT_PREFIX, Fault, LedgerOp, SimulatedLedger};

use crate::error::LedgerError;
use async_trait::async_trait;
use std::fmt;

/// Result type for ledger calls
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// File mode for a regular, non-executable blob
pub const FILE_MODE: &str = "100644";

/// Identifier of a ledger object (commit, tree or blob)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap a raw object id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated id for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(7)]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a tree being created on top of a base tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path of the file relative to the repository root
    pub path: String,
    /// Blob holding the file content
    pub blob: ObjectId,
    /// Git file mode
    pub mode: String,
}

impl TreeEntry {
    /// Regular file entry
    pub fn file(path: impl Into<String>, blob: ObjectId) -> Self {
        Self {
            path: path.into(),
            blob,
            mode: FILE_MODE.to_string(),
        }
    }
}

/// A commit as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Commit id
    pub id: ObjectId,
    /// Tree snapshot the commit points at
    pub tree: ObjectId,
}

/// Operations the retry engine needs from a remote repository
///
/// Every call is one network round trip (or its simulation). Implementations
/// must report an advanced tip during [`compare_and_swap_tip`] as
/// [`LedgerError::Conflict`], never overwrite it.
///
/// [`compare_and_swap_tip`]: RemoteLedger::compare_and_swap_tip
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    /// Current tip commit of `branch`
    async fn read_tip(&self, branch: &str) -> LedgerResult<ObjectId>;

    /// Look up a commit to find its tree
    async fn read_commit(&self, commit: &ObjectId) -> LedgerResult<CommitInfo>;

    /// Blob stored at `path` in `tree`, if any
    async fn read_tree_entry(&self, tree: &ObjectId, path: &str) -> LedgerResult<Option<ObjectId>>;

    /// Store file content
    async fn create_blob(&self, content: &str) -> LedgerResult<ObjectId>;

    /// Create a tree from `base_tree` with `entries` added or replaced
    async fn create_tree(&self, base_tree: &ObjectId, entries: &[TreeEntry])
    -> LedgerResult<ObjectId>;

    /// Create a commit object; does not move any branch
    async fn create_commit(
        &self,
        message: &str,
        tree: &ObjectId,
        parents: &[ObjectId],
    ) -> LedgerResult<ObjectId>;

    /// Move `branch` from `expected` to `new`, or fail with `Conflict`
    async fn compare_and_swap_tip(
        &self,
        branch: &str,
        expected: &ObjectId,
        new: &ObjectId,
    ) -> LedgerResult<()>;
}
