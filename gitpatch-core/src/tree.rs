//! In-memory directory tree used while a patch is applied
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. The path index and
//! the parent/child links both hold ids, never references, so the two views
//! cannot drift apart.

use std::collections::HashMap;

use crate::error::{PatchError, Result};
use crate::object::{FileMode, ObjectId, ObjectKind, TreeEntry, TreeListing};

/// Handle of a node inside a [`Tree`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Content address state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Address is valid
    Clean(ObjectId),
    /// Had an address, invalidated by a change below it
    Dirty,
    /// Synthesized during change application, never addressed
    New,
}

impl EntryState {
    /// The address, if the node is clean
    pub fn id(&self) -> Option<ObjectId> {
        match self {
            EntryState::Clean(id) => Some(*id),
            EntryState::Dirty | EntryState::New => None,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, EntryState::Clean(_))
    }
}

/// One blob, tree or submodule reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub mode: FileMode,
    pub kind: ObjectKind,
    pub state: EntryState,
    /// Basename only
    pub name: String,
    children: Vec<NodeId>,
}

impl Node {
    /// Create a node; the object kind follows from the mode
    pub fn new(mode: FileMode, state: EntryState, name: impl Into<String>) -> Self {
        Self {
            mode,
            kind: mode.kind(),
            state,
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// A directory synthesized to hold new content
    pub fn new_directory(name: impl Into<String>) -> Self {
        Self::new(FileMode::TREE, EntryState::New, name)
    }

    /// Children in insertion order (empty for non-tree nodes)
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Invalidate the address; a node that never had one stays `New`
    pub fn mark_dirty(&mut self) {
        if self.state.is_clean() {
            self.state = EntryState::Dirty;
        }
    }

    /// Tree entry for this node, if it currently has an address
    pub fn to_entry(&self) -> Option<TreeEntry> {
        self.state
            .id()
            .map(|id| TreeEntry::new(self.mode, self.kind, id, self.name.clone()))
    }
}

/// Directory hierarchy of one revision, mutable in place
#[derive(Debug, Default)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    /// Normalized path -> node (lookup only)
    index: HashMap<String, NodeId>,
    /// Top-level nodes in insertion order
    root: Vec<NodeId>,
}

/// Strip leading and trailing separators
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

impl Tree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize a tree from a full pre-order listing
    pub fn from_listing(listing: impl IntoIterator<Item = TreeListing>) -> Result<Self> {
        let mut tree = Self::new();
        for item in listing {
            let node = Node::new(item.mode, EntryState::Clean(item.id), base_name(&item.path));
            tree.add(&item.path, node)?;
        }
        Ok(tree)
    }

    /// Number of indexed nodes
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Top-level nodes in insertion order
    pub fn root(&self) -> &[NodeId] {
        &self.root
    }

    /// Resolve a handle.
    ///
    /// # Panics
    ///
    /// Panics if the id belongs to a node that has been removed.
    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0]
            .as_ref()
            .unwrap_or_else(|| panic!("stale node id {:?}", id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0]
            .as_mut()
            .unwrap_or_else(|| panic!("stale node id {:?}", id))
    }

    /// Handle of the node at `path`
    pub fn id_of(&self, path: &str) -> Option<NodeId> {
        self.index.get(normalize_path(path)).copied()
    }

    /// Node at `path`
    pub fn get(&self, path: &str) -> Option<&Node> {
        self.id_of(path).map(|id| self.node(id))
    }

    /// Mutable node at `path`
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Node> {
        let id = self.id_of(path)?;
        Some(self.node_mut(id))
    }

    /// Insert `node` at `path`. The node is renamed to the path's basename.
    ///
    /// # Panics
    ///
    /// Panics if `path` has a parent directory that is not in the tree.
    /// Callers create ancestors first (see [`Tree::create_or_dirty_ancestors`]).
    pub fn add(&mut self, path: &str, mut node: Node) -> Result<NodeId> {
        let path = normalize_path(path);
        if self.index.contains_key(path) {
            return Err(PatchError::DuplicatePath(path.to_string()));
        }

        let parent = match parent_of(path) {
            Some(parent_path) => Some(*self.index.get(parent_path).unwrap_or_else(|| {
                panic!(
                    "parent directory {:?} of {:?} is not in the tree",
                    parent_path, path
                )
            })),
            None => None,
        };

        node.name = base_name(path).to_string();
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        self.index.insert(path.to_string(), id);

        match parent {
            Some(parent_id) => self.node_mut(parent_id).children.push(id),
            None => self.root.push(id),
        }
        Ok(id)
    }

    /// Point an existing entry at new content
    pub fn set_entry(&mut self, path: &str, mode: FileMode, id: ObjectId) -> Result<NodeId> {
        let node_id = self
            .id_of(path)
            .ok_or_else(|| PatchError::NotFound(normalize_path(path).to_string()))?;
        let node = self.node_mut(node_id);
        node.mode = mode;
        node.kind = mode.kind();
        node.state = EntryState::Clean(id);
        Ok(node_id)
    }

    /// Detach the node at `path` from its parent and drop it, together with
    /// anything below it. Directories left empty are kept.
    pub fn remove(&mut self, path: &str) -> Option<Node> {
        let path = normalize_path(path);
        let id = self.index.remove(path)?;

        match parent_of(path).and_then(|p| self.index.get(p).copied()) {
            Some(parent_id) => self.node_mut(parent_id).children.retain(|c| *c != id),
            None => self.root.retain(|c| *c != id),
        }

        let node = self.nodes[id.0].take()?;
        let mut pending: Vec<(NodeId, String)> = node
            .children
            .iter()
            .map(|c| (*c, format!("{}/{}", path, self.node(*c).name)))
            .collect();
        while let Some((child_id, child_path)) = pending.pop() {
            self.index.remove(&child_path);
            if let Some(child) = self.nodes[child_id.0].take() {
                for grandchild in &child.children {
                    let name = &self.node(*grandchild).name;
                    pending.push((*grandchild, format!("{}/{}", child_path, name)));
                }
            }
        }
        Some(node)
    }

    /// Make sure every ancestor directory of `path` exists and is marked for
    /// re-hashing. Ancestors are handled shallowest first so each one's parent
    /// is already present when it is created.
    ///
    /// Fails with [`PatchError::DuplicatePath`] if `path` has an empty component.
    pub fn create_or_dirty_ancestors(&mut self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        for (end, _) in path.match_indices('/') {
            let ancestor = &path[..end];
            match self.index.get(ancestor).copied() {
                Some(id) => self.node_mut(id).mark_dirty(),
                None => {
                    self.add(ancestor, Node::new_directory(base_name(ancestor)))?;
                }
            }
        }
        Ok(())
    }

    /// Every node with its full path, parents before children
    pub fn walk(&self) -> Vec<(String, NodeId)> {
        let mut out = Vec::with_capacity(self.len());
        let mut pending: Vec<(String, NodeId)> = self
            .root
            .iter()
            .rev()
            .map(|id| (self.node(*id).name.clone(), *id))
            .collect();
        while let Some((path, id)) = pending.pop() {
            for child in self.node(id).children.iter().rev() {
                pending.push((format!("{}/{}", path, self.node(*child).name), *child));
            }
            out.push((path, id));
        }
        out
    }

    /// Number of nodes waiting for an address
    pub fn dirty_count(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| !n.state.is_clean())
            .count()
    }
}
