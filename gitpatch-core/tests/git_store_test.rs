//! Patch application against a real git repository
//!
//! Skipped when no `git` binary is available.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use bytes::Bytes;
use gitpatch_core::{
    CancellationToken, CommitInfo, FileMode, GitCliStore, ObjectStore, PatchConfig, PatchEngine, PatchError,
    PatchRequest, StorageError,
};
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim_end().to_string()
}

fn write(dir: &Path, path: &str, content: &str) {
    let full = dir.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

/// Repository with one commit; returns the directory and the commit id
fn init_repo() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q"]);
    write(dir.path(), "README.md", "hello\n");
    write(dir.path(), "src/lib.rs", "a\nb\nc\n");
    write(dir.path(), "old/path.txt", "moving\n");
    write(dir.path(), "old/other.txt", "staying\n");
    git(dir.path(), &["add", "-A"]);
    git(dir.path(), &["commit", "-q", "-m", "base"]);
    let head = git(dir.path(), &["rev-parse", "HEAD"]);
    (dir, head)
}

fn engine_for(dir: &Path) -> (PatchEngine, Arc<GitCliStore>) {
    let config = PatchConfig::default();
    let store = Arc::new(GitCliStore::new(dir, &config));
    (PatchEngine::new(store.clone(), config), store)
}

fn request(base: &str, patch: &str) -> PatchRequest {
    PatchRequest {
        base_revision: base.to_string(),
        patch: Bytes::from(patch.to_string()),
        commit: CommitInfo {
            messages: vec!["Apply patch".to_string()],
            author_name: Some("Patch Author".to_string()),
            author_email: Some("author@example.com".to_string()),
            ..CommitInfo::default()
        },
        is_root_commit: false,
    }
}

const PATCH: &str = "diff --git a/src/lib.rs b/src/lib.rs\n\
index 1111111..2222222 100644\n\
--- a/src/lib.rs\n\
+++ b/src/lib.rs\n\
@@ -1,3 +1,3 @@\n\
\x20a\n\
-b\n\
+B\n\
\x20c\n\
diff --git a/docs/new.md b/docs/new.md\n\
new file mode 100644\n\
--- /dev/null\n\
+++ b/docs/new.md\n\
@@ -0,0 +1 @@\n\
+new\n\
diff --git a/old/path.txt b/new/path.txt\n\
similarity index 100%\n\
rename from old/path.txt\n\
rename to new/path.txt\n";

#[tokio::test]
async fn test_patch_matches_git_write_tree() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let (dir, base) = init_repo();
    let (engine, store) = engine_for(dir.path());

    let commit = engine
        .apply_patch(request(&base, PATCH), &CancellationToken::new())
        .await
        .unwrap();
    let full_ref = store.update_ref("patched", commit).await.unwrap();
    assert_eq!(full_ref, "refs/heads/patched");

    // Make the same edits in the work tree and let git compute the tree
    write(dir.path(), "src/lib.rs", "a\nB\nc\n");
    write(dir.path(), "docs/new.md", "new\n");
    fs::create_dir_all(dir.path().join("new")).unwrap();
    fs::rename(dir.path().join("old/path.txt"), dir.path().join("new/path.txt")).unwrap();
    git(dir.path(), &["add", "-A"]);
    let expected = git(dir.path(), &["write-tree"]);

    assert_eq!(git(dir.path(), &["rev-parse", "patched^{tree}"]), expected);
    assert_eq!(git(dir.path(), &["rev-parse", "patched^"]), base);
    assert_eq!(git(dir.path(), &["log", "-1", "--format=%an <%ae>", "patched"]), "Patch Author <author@example.com>");
    assert_eq!(git(dir.path(), &["log", "-1", "--format=%B", "patched"]), "Apply patch");
}

#[tokio::test]
async fn test_empty_patch_reuses_base_tree() {
    if !git_available() {
        return;
    }
    let (dir, base) = init_repo();
    let (engine, _) = engine_for(dir.path());

    let commit = engine
        .apply_patch(request("HEAD", ""), &CancellationToken::new())
        .await
        .unwrap();
    let base_tree = git(dir.path(), &["rev-parse", &format!("{}^{{tree}}", base)]);
    let new_tree = git(dir.path(), &["rev-parse", &format!("{}^{{tree}}", commit)]);
    assert_eq!(base_tree, new_tree);
}

#[tokio::test]
async fn test_store_primitives() {
    if !git_available() {
        return;
    }
    let (dir, base) = init_repo();
    let (_, store) = engine_for(dir.path());

    assert_eq!(store.resolve("HEAD").await.unwrap().to_hex(), base);
    assert!(matches!(store.resolve("no-such-branch").await, Err(StorageError::NotFound(_))));

    let listing = store.list_tree_full("HEAD").await.unwrap();
    let paths: Vec<&str> = listing.iter().map(|l| l.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["README.md", "old", "old/other.txt", "old/path.txt", "src", "src/lib.rs"]
    );

    let blob = store.read_blob("HEAD", "src/lib.rs").await.unwrap();
    assert_eq!(&blob.data[..], b"a\nb\nc\n");
    assert_eq!(blob.mode, FileMode::REGULAR);
    assert!(matches!(store.read_blob("HEAD", "src").await, Err(StorageError::NotFound(_))));
    assert!(matches!(store.read_blob("HEAD", "missing.txt").await, Err(StorageError::NotFound(_))));

    let id = store.write_blob(Bytes::from_static(b"hello world\n")).await.unwrap();
    assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
}

#[tokio::test]
async fn test_malformed_patch_creates_no_commit() {
    if !git_available() {
        return;
    }
    let (dir, base) = init_repo();
    let (engine, _) = engine_for(dir.path());

    let err = engine
        .apply_patch(
            request(&base, "--- a/README.md\n+++ b/README.md\n@@ -1 +1 @@\n-goodbye\n+hi\n"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PatchError::MalformedHunk { .. }));
    assert_eq!(git(dir.path(), &["rev-parse", "HEAD"]), base);
}
