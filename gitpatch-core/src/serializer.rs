//! Tree and commit serialization
//!
//! Only nodes that lost their address are written back. Children are always
//! handled before their parent, so every tree object is created from entries
//! that already have an address.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{PatchError, Result};
use crate::object::{CommitRequest, ObjectId, ObjectKind, Signature, TreeEntry};
use crate::storage::{self, ObjectStore};
use crate::tree::{EntryState, NodeId, Tree};

/// Run one store call, giving up as soon as `cancel` fires
pub(crate) async fn with_cancel<T, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = storage::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PatchError::Canceled),
        result = call => result.map_err(PatchError::from),
    }
}

fn child_entries(tree: &Tree, children: &[NodeId], parent: &str) -> Result<Vec<TreeEntry>> {
    children
        .iter()
        .map(|id| {
            let node = tree.node(*id);
            node.to_entry().ok_or_else(|| {
                let path = if parent.is_empty() {
                    node.name.clone()
                } else {
                    format!("{}/{}", parent, node.name)
                };
                unaddressed(node.kind, path)
            })
        })
        .collect()
}

fn unaddressed(kind: ObjectKind, path: String) -> PatchError {
    match kind {
        ObjectKind::Blob => PatchError::MissingBlobAddress(path),
        kind => PatchError::UnsupportedEntryKind { kind, path },
    }
}

/// Write every dirty subtree and the root tree, returning the root tree id
pub async fn serialize(tree: &mut Tree, store: &dyn ObjectStore, cancel: &CancellationToken) -> Result<ObjectId> {
    // Reversed pre-order puts every child before its parent.
    let dirty: Vec<(String, NodeId)> = tree
        .walk()
        .into_iter()
        .rev()
        .filter(|(_, id)| !tree.node(*id).state.is_clean())
        .collect();

    for (path, id) in dirty {
        let node = tree.node(id);
        if node.kind != ObjectKind::Tree {
            return Err(unaddressed(node.kind, path));
        }
        let entries = child_entries(tree, node.children(), &path)?;
        let tree_id = with_cancel(cancel, store.create_tree(entries)).await?;
        debug!("Wrote tree {} for {}", tree_id, path);
        tree.node_mut(id).state = EntryState::Clean(tree_id);
    }

    let entries = child_entries(tree, tree.root(), "")?;
    let root_id = with_cancel(cancel, store.create_tree(entries)).await?;
    debug!("Wrote root tree {}", root_id);
    Ok(root_id)
}

/// Create a commit for `tree_id`, with `parent` as its only parent if given
pub async fn commit(
    store: &dyn ObjectStore,
    tree_id: ObjectId,
    parent: Option<ObjectId>,
    author: Signature,
    committer: Signature,
    message: String,
    cancel: &CancellationToken,
) -> Result<ObjectId> {
    let request = CommitRequest {
        tree_id,
        parents: parent.into_iter().collect(),
        author,
        committer,
        message,
    };
    with_cancel(cancel, store.create_commit(request)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::object::{FileMode, TreeListing};
    use crate::tree::Node;
    use bytes::Bytes;

    async fn store_with_base() -> (MemoryStore, ObjectId, Tree) {
        let store = MemoryStore::new();
        let a = store.write_blob(Bytes::from_static(b"a\n")).await.unwrap();
        let b = store.write_blob(Bytes::from_static(b"b\n")).await.unwrap();
        let dir = store
            .create_tree(vec![TreeEntry::new(FileMode::REGULAR, ObjectKind::Blob, b, "b.txt".to_string())])
            .await
            .unwrap();
        let root = store
            .create_tree(vec![
                TreeEntry::new(FileMode::REGULAR, ObjectKind::Blob, a, "a.txt".to_string()),
                TreeEntry::new(FileMode::TREE, ObjectKind::Tree, dir, "dir".to_string()),
            ])
            .await
            .unwrap();
        let tree = Tree::from_listing(vec![
            TreeListing {
                mode: FileMode::REGULAR,
                kind: ObjectKind::Blob,
                id: a,
                path: "a.txt".to_string(),
            },
            TreeListing {
                mode: FileMode::TREE,
                kind: ObjectKind::Tree,
                id: dir,
                path: "dir".to_string(),
            },
            TreeListing {
                mode: FileMode::REGULAR,
                kind: ObjectKind::Blob,
                id: b,
                path: "dir/b.txt".to_string(),
            },
        ])
        .unwrap();
        (store, root, tree)
    }

    #[tokio::test]
    async fn test_clean_tree_reproduces_root() {
        let (store, root, mut tree) = store_with_base().await;
        let id = serialize(&mut tree, &store, &CancellationToken::new()).await.unwrap();
        assert_eq!(id, root);
    }

    #[tokio::test]
    async fn test_dirty_subtree_is_rewritten() {
        let (store, root, mut tree) = store_with_base().await;
        let c = store.write_blob(Bytes::from_static(b"c\n")).await.unwrap();
        tree.create_or_dirty_ancestors("dir/new/c.txt").unwrap();
        tree.add("dir/new/c.txt", Node::new(FileMode::REGULAR, EntryState::Clean(c), "c.txt"))
            .unwrap();
        assert_eq!(tree.dirty_count(), 2);

        let id = serialize(&mut tree, &store, &CancellationToken::new()).await.unwrap();
        assert_ne!(id, root);
        assert_eq!(tree.dirty_count(), 0);

        let dir_id = tree.get("dir").unwrap().state.id().unwrap();
        let dir_entries = store.read_tree(&dir_id).await.unwrap();
        let names: Vec<&str> = dir_entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "new"]);

        let root_entries = store.read_tree(&id).await.unwrap();
        assert_eq!(root_entries[1].id, dir_id);
    }

    #[tokio::test]
    async fn test_dirty_blob_has_no_address() {
        let (store, _, mut tree) = store_with_base().await;
        tree.create_or_dirty_ancestors("dir/pending.txt").unwrap();
        tree.add("dir/pending.txt", Node::new(FileMode::REGULAR, EntryState::New, "pending.txt"))
            .unwrap();

        let err = serialize(&mut tree, &store, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PatchError::MissingBlobAddress(ref p) if p == "dir/pending.txt"));
    }

    #[tokio::test]
    async fn test_dirty_submodule_is_unsupported() {
        let (store, _, mut tree) = store_with_base().await;
        tree.add("vendor", Node::new(FileMode::SUBMODULE, EntryState::Dirty, "vendor"))
            .unwrap();

        let err = serialize(&mut tree, &store, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            PatchError::UnsupportedEntryKind { kind: ObjectKind::Commit, ref path } if path == "vendor"
        ));
    }

    #[tokio::test]
    async fn test_canceled_before_first_write() {
        let (store, _, mut tree) = store_with_base().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let before = store.object_count().await;

        let err = serialize(&mut tree, &store, &cancel).await.unwrap_err();
        assert!(matches!(err, PatchError::Canceled));
        assert_eq!(store.object_count().await, before);
    }

    #[tokio::test]
    async fn test_commit_with_and_without_parent() {
        let (store, root, _) = store_with_base().await;
        let cancel = CancellationToken::new();
        let sig = Signature::new("Dev", "dev@example.com");

        let first = commit(&store, root, None, sig.clone(), sig.clone(), "first".to_string(), &cancel)
            .await
            .unwrap();
        let second = commit(&store, root, Some(first), sig.clone(), sig, "second".to_string(), &cancel)
            .await
            .unwrap();

        assert!(store.read_commit(&first).await.unwrap().parents.is_empty());
        let stored = store.read_commit(&second).await.unwrap();
        assert_eq!(stored.parents, vec![first]);
        assert_eq!(stored.tree_id, root);
        assert_eq!(stored.message, "second\n");
    }
}
