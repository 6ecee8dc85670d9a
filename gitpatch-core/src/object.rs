//! Core object model for gitpatch
//!
//! Git-compatible identifiers, file modes and the value types exchanged with
//! an object store (tree entries, listings, blob reads, commit requests).

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for any stored object (SHA-1, as git computes it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Create a new ObjectId from raw bytes
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Compute the id git assigns to an object of `kind` with the given payload
    pub fn hash_object(kind: ObjectKind, data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(data.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a full 40-character hexadecimal string
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 20 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Object type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    /// Name used by git on the wire and in `ls-tree`/`mktree` lines
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            other => Err(format!("unknown object type: {}", other)),
        }
    }
}

/// Permission and type bits of a tree entry
///
/// Displayed the way `git ls-tree` prints it: six octal digits, e.g. `040000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileMode(u32);

impl FileMode {
    pub const REGULAR: FileMode = FileMode(0o100644);
    pub const EXECUTABLE: FileMode = FileMode(0o100755);
    pub const SYMLINK: FileMode = FileMode(0o120000);
    pub const TREE: FileMode = FileMode(0o040000);
    pub const SUBMODULE: FileMode = FileMode(0o160000);

    /// Parse an octal mode string such as `100644` or `40000`
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || !s.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            return None;
        }
        u32::from_str_radix(s, 8).ok().map(Self)
    }

    /// Object kind an entry with this mode points at
    pub fn kind(&self) -> ObjectKind {
        match self.0 & 0o170000 {
            0o040000 => ObjectKind::Tree,
            0o160000 => ObjectKind::Commit,
            _ => ObjectKind::Blob,
        }
    }

    /// Mode as it appears inside a raw tree object (no zero padding)
    pub fn to_tree_format(&self) -> String {
        format!("{:o}", self.0)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.0)
    }
}

/// Directory tree entry, as handed to `create_tree`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// File permissions and type
    pub mode: FileMode,
    /// Entry type
    pub kind: ObjectKind,
    /// Object ID (points to Blob, Tree or a submodule Commit)
    pub id: ObjectId,
    /// Name of the entry (basename only)
    pub name: String,
}

impl TreeEntry {
    /// Create a new tree entry
    pub fn new(mode: FileMode, kind: ObjectKind, id: ObjectId, name: String) -> Self {
        Self { mode, kind, id, name }
    }
}

/// One line of a recursive tree listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeListing {
    pub mode: FileMode,
    pub kind: ObjectKind,
    pub id: ObjectId,
    /// Full path from the repository root, `/` separated
    pub path: String,
}

/// Blob read back from a revision
#[derive(Debug, Clone)]
pub struct BlobContent {
    pub data: Bytes,
    pub mode: FileMode,
    pub id: ObjectId,
}

/// Author or committer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Date in any format git accepts; `None` means "now"
    pub date: Option<String>,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            date: None,
        }
    }
}

/// Everything needed to write a commit object
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Tree object ID for this commit
    pub tree_id: ObjectId,
    /// Parent commit IDs (empty for a root commit)
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Commit message
    pub message: String,
}
