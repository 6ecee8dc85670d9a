//! Object store backed by the `git` command line
//!
//! Every primitive is a single git invocation against a repository
//! directory. Arguments that come from callers are checked with the
//! argument guard before a process is spawned.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::PatchConfig;
use crate::guard::check_arg_safety;
use crate::memory_store::full_ref_name;
use crate::object::{BlobContent, CommitRequest, FileMode, ObjectId, ObjectKind, TreeEntry, TreeListing};
use crate::storage::{ObjectStore, Result, StorageError};

/// Git repository driven through its CLI
#[derive(Debug, Clone)]
pub struct GitCliStore {
    repo_dir: PathBuf,
    git_binary: String,
}

/// Parse one `ls-tree` record: `<mode> SP <type> SP <oid> TAB <path>`
fn parse_ls_tree_record(record: &[u8]) -> Result<TreeListing> {
    let bad = || StorageError::Parse(format!("unexpected ls-tree output: {:?}", String::from_utf8_lossy(record)));
    let tab = record.iter().position(|b| *b == b'\t').ok_or_else(bad)?;
    let meta = std::str::from_utf8(&record[..tab]).map_err(|_| bad())?;
    let path = String::from_utf8_lossy(&record[tab + 1..]).into_owned();

    let mut fields = meta.split(' ');
    let (Some(mode), Some(kind), Some(id), None) = (fields.next(), fields.next(), fields.next(), fields.next()) else {
        return Err(bad());
    };
    Ok(TreeListing {
        mode: FileMode::parse(mode).ok_or_else(bad)?,
        kind: kind.parse::<ObjectKind>().map_err(|_| bad())?,
        id: ObjectId::from_hex(id).map_err(|_| bad())?,
        path,
    })
}

fn parse_ls_tree(output: &[u8]) -> Result<Vec<TreeListing>> {
    output
        .split(|b| *b == 0)
        .filter(|record| !record.is_empty())
        .map(parse_ls_tree_record)
        .collect()
}

fn parse_object_id(output: &[u8]) -> Result<ObjectId> {
    let text = String::from_utf8_lossy(output);
    ObjectId::from_hex(text.trim()).map_err(|_| StorageError::Parse(format!("expected an object id, got {:?}", text.trim())))
}

impl GitCliStore {
    pub fn new(repo_dir: impl Into<PathBuf>, config: &PatchConfig) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            git_binary: config.git_binary.clone(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Run git with `args`, feeding `input` on stdin, and return its stdout.
    async fn git(&self, args: &[&str], input: Option<&[u8]>, env: &[(&str, &str)]) -> Result<Vec<u8>> {
        debug!("Running git {}", args.join(" "));
        let mut child = Command::new(&self.git_binary)
            .args(args)
            .current_dir(&self.repo_dir)
            .envs(env.iter().copied())
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child.stdin.take();
        let feed = async move {
            if let (Some(pipe), Some(data)) = (stdin.as_mut(), input) {
                pipe.write_all(data).await?;
            }
            drop(stdin);
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("git {} failed: {}", args.join(" "), stderr);
            return Err(StorageError::Command {
                command: format!("git {}", args.join(" ")),
                stderr,
                exit_code: output.status.code(),
            });
        }
        fed?;
        Ok(output.stdout)
    }

    /// Point `name` at `id`. Short names are taken as branches
    /// (`main` -> `refs/heads/main`). Returns the full ref name.
    pub async fn update_ref(&self, name: &str, id: ObjectId) -> Result<String> {
        check_arg_safety(name)?;
        let full = full_ref_name(name);
        let hex = id.to_hex();
        self.git(&["update-ref", "--", &full, &hex], None, &[]).await?;
        Ok(full)
    }
}

#[async_trait]
impl ObjectStore for GitCliStore {
    async fn resolve(&self, revision: &str) -> Result<ObjectId> {
        check_arg_safety(revision)?;
        let spec = format!("{}^{{commit}}", revision);
        match self.git(&["rev-parse", "--verify", "--quiet", &spec], None, &[]).await {
            Ok(out) => parse_object_id(&out),
            Err(StorageError::Command { .. }) => Err(StorageError::NotFound(revision.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn read_blob(&self, revision: &str, path: &str) -> Result<BlobContent> {
        check_arg_safety(revision)?;
        check_arg_safety(path)?;
        let not_found = || StorageError::NotFound(format!("{}:{}", revision, path));

        let out = self
            .git(&["ls-tree", "-z", "--full-tree", revision, "--", path.trim_matches('/')], None, &[])
            .await
            .map_err(|e| match e {
                StorageError::Command { .. } => not_found(),
                other => other,
            })?;
        let entry = parse_ls_tree(&out)?.into_iter().next().ok_or_else(not_found)?;
        if entry.kind != ObjectKind::Blob {
            return Err(not_found());
        }

        let hex = entry.id.to_hex();
        let data = self.git(&["cat-file", "blob", &hex], None, &[]).await?;
        Ok(BlobContent {
            data: Bytes::from(data),
            mode: entry.mode,
            id: entry.id,
        })
    }

    async fn list_tree_full(&self, revision: &str) -> Result<Vec<TreeListing>> {
        check_arg_safety(revision)?;
        let out = self
            .git(&["ls-tree", "-z", "-r", "-t", "--full-tree", revision], None, &[])
            .await
            .map_err(|e| match e {
                StorageError::Command { .. } => StorageError::NotFound(revision.to_string()),
                other => other,
            })?;
        parse_ls_tree(&out)
    }

    async fn write_blob(&self, data: Bytes) -> Result<ObjectId> {
        let out = self.git(&["hash-object", "-w", "--stdin"], Some(&data[..]), &[]).await?;
        parse_object_id(&out)
    }

    async fn create_tree(&self, entries: Vec<TreeEntry>) -> Result<ObjectId> {
        let mut input = Vec::new();
        for entry in &entries {
            input.extend_from_slice(format!("{} {} {}\t", entry.mode, entry.kind, entry.id).as_bytes());
            input.extend_from_slice(entry.name.as_bytes());
            input.push(0);
        }
        let out = self.git(&["mktree", "-z"], Some(&input[..]), &[]).await?;
        parse_object_id(&out)
    }

    async fn create_commit(&self, commit: CommitRequest) -> Result<ObjectId> {
        let tree = commit.tree_id.to_hex();
        let parents: Vec<String> = commit.parents.iter().map(ObjectId::to_hex).collect();
        let mut args = vec!["commit-tree", tree.as_str()];
        for parent in &parents {
            args.push("-p");
            args.push(parent);
        }

        let mut env = vec![
            ("GIT_AUTHOR_NAME", commit.author.name.as_str()),
            ("GIT_AUTHOR_EMAIL", commit.author.email.as_str()),
            ("GIT_COMMITTER_NAME", commit.committer.name.as_str()),
            ("GIT_COMMITTER_EMAIL", commit.committer.email.as_str()),
        ];
        if let Some(date) = commit.author.date.as_deref() {
            env.push(("GIT_AUTHOR_DATE", date));
        }
        if let Some(date) = commit.committer.date.as_deref() {
            env.push(("GIT_COMMITTER_DATE", date));
        }

        // Message goes through stdin so it may hold anything
        let out = self.git(&args, Some(commit.message.as_bytes()), &env).await?;
        parse_object_id(&out)
    }
}
