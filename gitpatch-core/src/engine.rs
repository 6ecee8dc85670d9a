//! Patch-to-commit engine
//!
//! One call turns a base revision and a unified diff into a new commit:
//!
//! 1. validate every revision and path taken from the request
//! 2. materialize the base tree from a single full listing
//! 3. for each file diff, compute and store the new blob, then update the tree
//! 4. write every dirty subtree bottom-up and commit the new root tree
//!
//! Nothing touches a working directory. Blobs written before a failure or a
//! cancellation are left in the store; no commit is created in that case.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::change::{apply_change, ChangeStatus, ChangedFile};
use crate::config::PatchConfig;
use crate::diff::{parse_unified_diff, FileDiff};
use crate::error::{PatchError, Result};
use crate::guard::{check_arg_safety, check_args_safety};
use crate::hunk::apply_hunks;
use crate::object::{FileMode, ObjectId, ObjectKind, Signature};
use crate::serializer::{commit, serialize, with_cancel};
use crate::storage::ObjectStore;
use crate::tree::Tree;

/// Commit metadata supplied with a patch; empty fields fall back to config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitInfo {
    /// Joined with a blank line between each
    pub messages: Vec<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    /// Used for both author and committer; `None` means now
    pub date: Option<String>,
}

/// A request to create a commit from a patch
#[derive(Debug, Clone)]
pub struct PatchRequest {
    pub base_revision: String,
    pub patch: Bytes,
    pub commit: CommitInfo,
    /// Create a parentless commit instead of a child of the base
    pub is_root_commit: bool,
}

/// Applies patches against an [`ObjectStore`]
pub struct PatchEngine {
    store: Arc<dyn ObjectStore>,
    config: PatchConfig,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

impl PatchEngine {
    pub fn new(store: Arc<dyn ObjectStore>, config: PatchConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// Apply `request.patch` on top of `request.base_revision` and return the
    /// id of the new commit.
    pub async fn apply_patch(&self, request: PatchRequest, cancel: &CancellationToken) -> Result<ObjectId> {
        check_arg_safety(&request.base_revision)?;
        let files = parse_unified_diff(&request.patch)?;
        for file in &files {
            check_args_safety(file.paths())?;
        }

        let base = with_cancel(cancel, self.store.resolve(&request.base_revision)).await?;
        let base_rev = base.to_hex();
        let listing = with_cancel(cancel, self.store.list_tree_full(&base_rev)).await?;
        let mut tree = Tree::from_listing(listing)?;
        debug!("Loaded {} entries from {}", tree.len(), base_rev);

        for file in &files {
            let change = self.prepare_change(&tree, &base_rev, file, cancel).await?;
            debug!("Applying {:?} {}", change.status, file.display_path());
            apply_change(&mut tree, &change)?;
        }

        let tree_id = serialize(&mut tree, self.store.as_ref(), cancel).await?;
        let (author, committer, message) = self.commit_metadata(&request.commit);
        let parent = if request.is_root_commit { None } else { Some(base) };
        let commit_id = commit(self.store.as_ref(), tree_id, parent, author, committer, message, cancel).await?;

        info!(
            "Applied patch ({} files) on {}: tree {}, commit {}",
            files.len(),
            request.base_revision,
            tree_id,
            commit_id
        );
        Ok(commit_id)
    }

    /// Turn a parsed file diff into a change record, writing its new blob
    async fn prepare_change(
        &self,
        tree: &Tree,
        base_rev: &str,
        file: &FileDiff,
        cancel: &CancellationToken,
    ) -> Result<ChangedFile> {
        let mut change = ChangedFile {
            status: file.status,
            src_mode: file.old_mode,
            dst_mode: file.new_mode,
            src_id: None,
            dst_id: None,
            src_path: file.old_path.clone().unwrap_or_default(),
            dst_path: file.new_path.clone(),
        };

        match file.status {
            ChangeStatus::Delete => {}
            ChangeStatus::Add => {
                change.src_path = file.new_path.clone().unwrap_or_default();
                change.dst_path = None;
                let mode = file.new_mode.unwrap_or(FileMode::REGULAR);
                change.dst_mode = Some(mode);
                change.dst_id = Some(self.new_content(&change.src_path, mode, None, file, cancel).await?);
            }
            ChangeStatus::Modify | ChangeStatus::Rename | ChangeStatus::Copy => {
                let source = tree
                    .get(&change.src_path)
                    .ok_or_else(|| PatchError::NotFound(change.src_path.clone()))?;
                let mode = file.new_mode.unwrap_or(source.mode);
                change.src_mode = Some(source.mode);
                change.src_id = source.state.id();
                change.dst_mode = Some(mode);

                change.dst_id = if file.hunks.is_empty() {
                    // Content unchanged; a Modify without hunks only touches the mode
                    match file.status {
                        ChangeStatus::Modify => None,
                        _ => change.src_id,
                    }
                } else {
                    let target = file.new_path.as_deref().unwrap_or(&change.src_path);
                    Some(self.new_content(target, mode, Some(base_rev), file, cancel).await?)
                };
            }
            status => {
                return Err(PatchError::UnsupportedChangeStatus {
                    status,
                    path: change.src_path,
                })
            }
        }
        Ok(change)
    }

    /// Address of a file's content after its hunks are applied
    async fn new_content(
        &self,
        path: &str,
        mode: FileMode,
        base_rev: Option<&str>,
        file: &FileDiff,
        cancel: &CancellationToken,
    ) -> Result<ObjectId> {
        if mode.kind() == ObjectKind::Commit {
            return file.submodule_target().ok_or_else(|| PatchError::MalformedHunk {
                path: path.to_string(),
                reason: "submodule change without a Subproject commit line".to_string(),
            });
        }

        let original = match (base_rev, file.old_path.as_deref()) {
            (Some(rev), Some(old_path)) => with_cancel(cancel, self.store.read_blob(rev, old_path)).await?.data,
            _ => Bytes::new(),
        };
        let patched = apply_hunks(path, &original, &file.hunks)?;
        let id = with_cancel(cancel, self.store.write_blob(Bytes::from(patched))).await?;
        debug!("Wrote blob {} for {}", id, path);
        Ok(id)
    }

    /// Author, committer and message after applying defaults
    fn commit_metadata(&self, info: &CommitInfo) -> (Signature, Signature, String) {
        let author_name = non_empty(&info.author_name).unwrap_or_else(|| self.config.author_name.clone());
        let author_email = non_empty(&info.author_email).unwrap_or_else(|| self.config.author_email.clone());
        let committer_name = non_empty(&info.committer_name)
            .or_else(|| non_empty(&self.config.committer_name))
            .unwrap_or_else(|| author_name.clone());
        let committer_email = non_empty(&info.committer_email)
            .or_else(|| non_empty(&self.config.committer_email))
            .unwrap_or_else(|| author_email.clone());

        let message = if info.messages.is_empty() {
            self.config.default_message.clone()
        } else {
            info.messages.join("\n\n")
        };

        let author = Signature {
            name: author_name,
            email: author_email,
            date: info.date.clone(),
        };
        let committer = Signature {
            name: committer_name,
            email: committer_email,
            date: info.date.clone(),
        };
        (author, committer, message)
    }
}
