//! Errors returned by the patch engine

use crate::storage::StorageError;

/// Result type for patch application
pub type Result<T> = std::result::Result<T, PatchError>;

/// Errors that can occur while turning a patch into a commit
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("Path already exists in tree: {0}")]
    DuplicatePath(String),

    #[error("Unsupported change status {status:?} for {path}")]
    UnsupportedChangeStatus {
        status: crate::change::ChangeStatus,
        path: String,
    },

    #[error("Malformed hunk in {path}: {reason}")]
    MalformedHunk { path: String, reason: String },

    #[error("Blob entry has no address: {0}")]
    MissingBlobAddress(String),

    #[error("Cannot serialize dirty {kind} entry: {path}")]
    UnsupportedEntryKind {
        kind: crate::object::ObjectKind,
        path: String,
    },

    #[error("Unsafe argument: {0:?}")]
    UnsafeArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Patch application canceled")]
    Canceled,

    #[error("Invalid diff at line {line}: {reason}")]
    InvalidDiff { line: usize, reason: String },

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for PatchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => PatchError::NotFound(what),
            StorageError::UnsafeArgument(arg) => PatchError::UnsafeArgument(arg),
            other => PatchError::Storage(other),
        }
    }
}
