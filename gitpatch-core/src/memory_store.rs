//! In-memory object store
//!
//! Objects are framed and hashed exactly as git does, so ids computed here
//! match the ones a real repository would assign to the same content.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::guard::check_arg_safety;
use crate::object::{BlobContent, CommitRequest, FileMode, ObjectId, ObjectKind, Signature, TreeEntry, TreeListing};
use crate::storage::{ObjectStore, Result, StorageError};

/// Commit fields read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCommit {
    pub tree_id: ObjectId,
    pub parents: Vec<ObjectId>,
    /// `Name <email> <timestamp> <tz>`
    pub author: String,
    pub committer: String,
    pub message: String,
}

/// Git-compatible object store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<ObjectId, (ObjectKind, Bytes)>>>,
    refs: Arc<RwLock<HashMap<String, ObjectId>>>,
}

/// Git orders tree entries by name, comparing trees as if they ended in `/`
fn tree_sort_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.as_bytes().to_vec();
    if entry.kind == ObjectKind::Tree {
        key.push(b'/');
    }
    key
}

fn encode_tree(mut entries: Vec<TreeEntry>) -> Vec<u8> {
    entries.sort_by_key(tree_sort_key);
    let mut out = Vec::new();
    for entry in entries {
        out.extend_from_slice(entry.mode.to_tree_format().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.id.as_bytes());
    }
    out
}

fn decode_tree(data: &[u8]) -> Result<Vec<TreeEntry>> {
    let corrupt = || StorageError::Parse("corrupt tree object".to_string());
    let mut entries = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let space = rest.iter().position(|b| *b == b' ').ok_or_else(corrupt)?;
        let mode = std::str::from_utf8(&rest[..space])
            .ok()
            .and_then(FileMode::parse)
            .ok_or_else(corrupt)?;
        rest = &rest[space + 1..];

        let nul = rest.iter().position(|b| *b == 0).ok_or_else(corrupt)?;
        let name = String::from_utf8_lossy(&rest[..nul]).into_owned();
        rest = &rest[nul + 1..];

        let raw: [u8; 20] = rest.get(..20).ok_or_else(corrupt)?.try_into().map_err(|_| corrupt())?;
        rest = &rest[20..];

        entries.push(TreeEntry::new(mode, mode.kind(), ObjectId::new(raw), name));
    }
    Ok(entries)
}

/// Signature as it appears in a commit header
fn format_signature(sig: &Signature) -> String {
    let date = match sig.date.as_deref() {
        None => format!("{} +0000", chrono::Utc::now().timestamp()),
        Some(date) => match chrono::DateTime::parse_from_rfc3339(date) {
            Ok(parsed) => format!("{} {}", parsed.timestamp(), parsed.format("%z")),
            // Assume git's internal "<seconds> <tz>" form
            Err(_) => date.to_string(),
        },
    };
    format!("{} <{}> {}", sig.name, sig.email, date)
}

fn parse_commit(data: &[u8]) -> Result<StoredCommit> {
    let text = String::from_utf8_lossy(data);
    let (header, message) = text.split_once("\n\n").unwrap_or((&text[..], ""));

    let mut tree_id = None;
    let mut parents = Vec::new();
    let mut author = String::new();
    let mut committer = String::new();
    for line in header.lines() {
        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        match key {
            "tree" => tree_id = ObjectId::from_hex(value).ok(),
            "parent" => parents.push(
                ObjectId::from_hex(value).map_err(|_| StorageError::Parse(format!("bad parent line: {}", line)))?,
            ),
            "author" => author = value.to_string(),
            "committer" => committer = value.to_string(),
            _ => {}
        }
    }

    Ok(StoredCommit {
        tree_id: tree_id.ok_or_else(|| StorageError::Parse("commit without tree".to_string()))?,
        parents,
        author,
        committer,
        message: message.to_string(),
    })
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn put(&self, kind: ObjectKind, data: Bytes) -> ObjectId {
        let id = ObjectId::hash_object(kind, &data);
        self.objects.write().await.entry(id).or_insert((kind, data));
        id
    }

    async fn get(&self, id: &ObjectId, kind: ObjectKind) -> Result<Bytes> {
        match self.objects.read().await.get(id) {
            Some((k, data)) if *k == kind => Ok(data.clone()),
            _ => Err(StorageError::NotFound(format!("{} {}", kind, id))),
        }
    }

    /// Point `name` at a commit. Short names land under `refs/heads/`.
    pub async fn set_ref(&self, name: &str, id: ObjectId) {
        self.refs.write().await.insert(full_ref_name(name), id);
    }

    /// Current target of a ref
    pub async fn get_ref(&self, name: &str) -> Option<ObjectId> {
        self.refs.read().await.get(&full_ref_name(name)).copied()
    }

    /// Number of stored objects
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Read and parse a commit object
    pub async fn read_commit(&self, id: &ObjectId) -> Result<StoredCommit> {
        let data = self.get(id, ObjectKind::Commit).await?;
        parse_commit(&data)
    }

    /// Entries of a tree object, in stored order
    pub async fn read_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>> {
        let data = self.get(id, ObjectKind::Tree).await?;
        decode_tree(&data)
    }

    async fn root_tree(&self, revision: &str) -> Result<ObjectId> {
        let commit = self.resolve(revision).await?;
        Ok(self.read_commit(&commit).await?.tree_id)
    }
}

/// `main` -> `refs/heads/main`; names already under `refs/` are kept
pub fn full_ref_name(name: &str) -> String {
    if name.starts_with("refs/") || name == "HEAD" {
        name.to_string()
    } else {
        format!("refs/heads/{}", name)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn resolve(&self, revision: &str) -> Result<ObjectId> {
        check_arg_safety(revision)?;
        let not_found = || StorageError::NotFound(revision.to_string());
        let id = match self.get_ref(revision).await {
            Some(id) => id,
            None => ObjectId::from_hex(revision).map_err(|_| not_found())?,
        };
        self.get(&id, ObjectKind::Commit).await.map_err(|_| not_found())?;
        Ok(id)
    }

    async fn read_blob(&self, revision: &str, path: &str) -> Result<BlobContent> {
        check_arg_safety(revision)?;
        check_arg_safety(path)?;
        let not_found = || StorageError::NotFound(format!("{}:{}", revision, path));

        let mut tree_id = self.root_tree(revision).await?;
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        for (n, name) in components.iter().enumerate() {
            let entries = self.read_tree(&tree_id).await?;
            let entry = entries.into_iter().find(|e| e.name == *name).ok_or_else(not_found)?;
            match (entry.kind, n + 1 < components.len()) {
                (ObjectKind::Tree, true) => tree_id = entry.id,
                (ObjectKind::Blob, false) => {
                    let data = self.get(&entry.id, ObjectKind::Blob).await?;
                    return Ok(BlobContent {
                        data,
                        mode: entry.mode,
                        id: entry.id,
                    });
                }
                _ => return Err(not_found()),
            }
        }
        Err(not_found())
    }

    async fn list_tree_full(&self, revision: &str) -> Result<Vec<TreeListing>> {
        check_arg_safety(revision)?;
        let root = self.root_tree(revision).await?;

        let mut out = Vec::new();
        let mut pending: Vec<(String, TreeEntry)> = self
            .read_tree(&root)
            .await?
            .into_iter()
            .rev()
            .map(|e| (e.name.clone(), e))
            .collect();
        while let Some((path, entry)) = pending.pop() {
            if entry.kind == ObjectKind::Tree {
                for child in self.read_tree(&entry.id).await?.into_iter().rev() {
                    pending.push((format!("{}/{}", path, child.name), child));
                }
            }
            out.push(TreeListing {
                mode: entry.mode,
                kind: entry.kind,
                id: entry.id,
                path,
            });
        }
        Ok(out)
    }

    async fn write_blob(&self, data: Bytes) -> Result<ObjectId> {
        Ok(self.put(ObjectKind::Blob, data).await)
    }

    async fn create_tree(&self, entries: Vec<TreeEntry>) -> Result<ObjectId> {
        for entry in &entries {
            if entry.name.is_empty() || entry.name.contains('/') || entry.name.contains('\0') {
                return Err(StorageError::Parse(format!("invalid tree entry name {:?}", entry.name)));
            }
            // Gitlinks point into another repository
            if entry.kind != ObjectKind::Commit {
                self.get(&entry.id, entry.kind).await?;
            }
        }
        Ok(self.put(ObjectKind::Tree, Bytes::from(encode_tree(entries))).await)
    }

    async fn create_commit(&self, commit: CommitRequest) -> Result<ObjectId> {
        self.get(&commit.tree_id, ObjectKind::Tree).await?;
        let mut text = format!("tree {}\n", commit.tree_id);
        for parent in &commit.parents {
            self.get(parent, ObjectKind::Commit).await?;
            text.push_str(&format!("parent {}\n", parent));
        }
        text.push_str(&format!("author {}\n", format_signature(&commit.author)));
        text.push_str(&format!("committer {}\n", format_signature(&commit.committer)));
        text.push('\n');
        text.push_str(&commit.message);
        if !commit.message.ends_with('\n') {
            text.push('\n');
        }
        Ok(self.put(ObjectKind::Commit, Bytes::from(text)).await)
    }
}
