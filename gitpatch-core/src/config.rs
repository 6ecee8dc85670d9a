//! Patch service configuration
//!
//! Stored as JSON. A missing file means defaults; explicit values (for
//! example CLI flags) are layered on top by the caller.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Commit identity and git settings used when a request leaves them out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub author_name: String,
    pub author_email: String,
    /// Falls back to the author name
    pub committer_name: Option<String>,
    /// Falls back to the author email
    pub committer_email: Option<String>,
    /// Message used when a request carries none
    pub default_message: String,
    /// Program spawned by the git CLI store
    pub git_binary: String,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            author_name: "gitpatch".to_string(),
            author_email: "gitpatch@localhost".to_string(),
            committer_name: None,
            committer_email: None,
            default_message: "Creating commit from patch".to_string(),
            git_binary: "git".to_string(),
        }
    }
}

impl PatchConfig {
    /// Load config from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).with_context(|| format!("Failed to read patch config from {:?}", path))?;
        let config: PatchConfig =
            serde_json::from_str(&data).with_context(|| format!("Failed to parse patch config JSON in {:?}", path))?;
        Ok(config)
    }

    /// Save config to `path`, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
