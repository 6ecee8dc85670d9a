//! File-level change records and their effect on a [`Tree`]

use crate::error::{PatchError, Result};
use crate::object::{FileMode, ObjectId};
use crate::tree::{EntryState, Node, Tree};

/// What happened to a file, in `git diff --name-status` terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Modify,
    Add,
    Copy,
    Rename,
    Delete,
    /// Never applied
    TypeChange,
    /// Never applied
    Unmerged,
}

/// One file change, already reduced to modes and object ids
///
/// For `Add` the new file's path is carried in `src_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub status: ChangeStatus,
    pub src_mode: Option<FileMode>,
    pub dst_mode: Option<FileMode>,
    pub src_id: Option<ObjectId>,
    pub dst_id: Option<ObjectId>,
    pub src_path: String,
    pub dst_path: Option<String>,
}

impl ChangedFile {
    /// Path the change ends up at
    pub fn effective_path(&self) -> &str {
        match self.status {
            ChangeStatus::Copy | ChangeStatus::Rename => self.dst_path.as_deref().unwrap_or(&self.src_path),
            _ => &self.src_path,
        }
    }
}

/// Apply one change to the tree, dirtying every ancestor it touches
pub fn apply_change(tree: &mut Tree, change: &ChangedFile) -> Result<()> {
    match change.status {
        ChangeStatus::Modify => modify(tree, change),
        ChangeStatus::Add | ChangeStatus::Copy => insert(tree, change),
        ChangeStatus::Rename => {
            delete(tree, &change.src_path)?;
            insert(tree, change)
        }
        ChangeStatus::Delete => delete(tree, &change.src_path),
        status @ (ChangeStatus::TypeChange | ChangeStatus::Unmerged) => Err(PatchError::UnsupportedChangeStatus {
            status,
            path: change.src_path.clone(),
        }),
    }
}

fn modify(tree: &mut Tree, change: &ChangedFile) -> Result<()> {
    let path = &change.src_path;
    match change.dst_id {
        Some(id) => {
            let mode = match change.dst_mode {
                Some(mode) => mode,
                None => tree.get(path).ok_or_else(|| PatchError::NotFound(path.clone()))?.mode,
            };
            tree.set_entry(path, mode, id)?;
        }
        None => {
            // Mode change only
            let node = tree.get_mut(path).ok_or_else(|| PatchError::NotFound(path.clone()))?;
            if let Some(mode) = change.dst_mode {
                node.mode = mode;
                node.kind = mode.kind();
            }
        }
    }
    tree.create_or_dirty_ancestors(path)?;
    Ok(())
}

fn insert(tree: &mut Tree, change: &ChangedFile) -> Result<()> {
    let path = change.effective_path();
    let mode = change.dst_mode.or(change.src_mode).unwrap_or(FileMode::REGULAR);
    let state = change.dst_id.map_or(EntryState::New, EntryState::Clean);

    tree.create_or_dirty_ancestors(path)?;
    tree.add(path, Node::new(mode, state, path))?;
    Ok(())
}

fn delete(tree: &mut Tree, path: &str) -> Result<()> {
    if tree.get(path).is_none() {
        return Err(PatchError::NotFound(path.to_string()));
    }
    tree.create_or_dirty_ancestors(path)?;
    tree.remove(path);
    Ok(())
}
