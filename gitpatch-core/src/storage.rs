//! Storage abstraction layer for gitpatch
//!
//! The patch engine never reads or writes objects itself; it drives an
//! [`ObjectStore`] through a handful of git primitives.

use async_trait::async_trait;
use bytes::Bytes;

use crate::object::{BlobContent, CommitRequest, ObjectId, TreeEntry, TreeListing};

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsafe argument: {0:?}")]
    UnsafeArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` failed with exit code {exit_code:?}: {stderr}")]
    Command {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Unexpected store output: {0}")]
    Parse(String),
}

/// Object store primitives consumed by the patch engine
///
/// Implementations must be content addressed: writing the same object twice
/// yields the same id and is harmless.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Resolve a revision expression to a commit id
    async fn resolve(&self, revision: &str) -> Result<ObjectId>;

    /// Read the blob at `path` in `revision`
    async fn read_blob(&self, revision: &str, path: &str) -> Result<BlobContent>;

    /// List every entry of the revision's tree recursively, trees included
    ///
    /// The listing is in pre-order: a directory always precedes its contents.
    async fn list_tree_full(&self, revision: &str) -> Result<Vec<TreeListing>>;

    /// Store blob content (returns the blob ID)
    async fn write_blob(&self, data: Bytes) -> Result<ObjectId>;

    /// Create a tree object from entries (returns the tree ID)
    async fn create_tree(&self, entries: Vec<TreeEntry>) -> Result<ObjectId>;

    /// Create a commit object (returns the commit ID)
    async fn create_commit(&self, commit: CommitRequest) -> Result<ObjectId>;
}
