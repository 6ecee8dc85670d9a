//! gitpatch core library
//!
//! Creates commits from unified diffs without a working directory: the base
//! tree is rebuilt in memory, the diff is applied to it, and only the
//! subtrees that changed are written back to the object store.

pub mod change;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod git_store;
pub mod guard;
pub mod hunk;
pub mod memory_store;
pub mod object;
pub mod serializer;
pub mod storage;
pub mod tree;

pub use change::{apply_change, ChangeStatus, ChangedFile};
pub use config::PatchConfig;
pub use diff::{parse_unified_diff, FileDiff, Hunk, HunkLine, LineTag};
pub use engine::{CommitInfo, PatchEngine, PatchRequest};
pub use error::{PatchError, Result};
pub use git_store::GitCliStore;
pub use hunk::apply_hunks;
pub use memory_store::{MemoryStore, StoredCommit};
pub use object::{BlobContent, CommitRequest, FileMode, ObjectId, ObjectKind, Signature, TreeEntry, TreeListing};
pub use serializer::{commit, serialize};
pub use storage::{ObjectStore, StorageError};
pub use tree::{EntryState, Node, NodeId, Tree};

// Re-export so callers can build cancellation tokens without a direct dependency
pub use tokio_util::sync::CancellationToken;
