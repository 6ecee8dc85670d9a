//! gitpatch - create git commits from unified diffs
//!
//! Applies a patch to a revision of a git repository without checking
//! anything out and prints the id of the resulting commit.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use gitpatch_core::{CommitInfo, GitCliStore, PatchConfig, PatchEngine, PatchRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gitpatch")]
#[command(author = "gitpatch Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Create commits from unified diffs without a checkout", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply a patch on top of a revision and print the new commit id
    Apply {
        /// Git repository directory
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Base revision
        #[arg(short, long, default_value = "HEAD")]
        base: String,

        /// Patch file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        patch: String,

        /// Commit message (repeat for more paragraphs)
        #[arg(short, long = "message")]
        message: Vec<String>,

        /// Author name
        #[arg(long)]
        author_name: Option<String>,

        /// Author email
        #[arg(long)]
        author_email: Option<String>,

        /// Commit date (any format git accepts)
        #[arg(long)]
        date: Option<String>,

        /// Create a commit without parents
        #[arg(long)]
        root: bool,

        /// Point this ref at the new commit (short names are branches)
        #[arg(long)]
        target_ref: Option<String>,

        /// Config file
        #[arg(short, long, default_value = "gitpatch.json")]
        config: PathBuf,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Write a config file with default values
    InitConfig {
        /// Where to write the config
        #[arg(default_value = "gitpatch.json")]
        path: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

async fn read_patch(source: &str) -> Result<Bytes> {
    let mut data = Vec::new();
    if source == "-" {
        tokio::io::stdin()
            .read_to_end(&mut data)
            .await
            .context("Failed to read patch from stdin")?;
    } else {
        data = tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read patch file {}", source))?;
    }
    Ok(Bytes::from(data))
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, canceling");
            token.cancel();
        }
    });
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    PatchConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            repo,
            base,
            patch,
            message,
            author_name,
            author_email,
            date,
            root,
            target_ref,
            config,
            debug,
        } => {
            init_tracing(debug);

            let config = PatchConfig::load(&config)?;
            let store = Arc::new(GitCliStore::new(&repo, &config));
            let engine = PatchEngine::new(store.clone(), config);

            let request = PatchRequest {
                base_revision: base,
                patch: read_patch(&patch).await?,
                commit: CommitInfo {
                    messages: message,
                    author_name,
                    author_email,
                    date,
                    ..CommitInfo::default()
                },
                is_root_commit: root,
            };

            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let commit = engine
                .apply_patch(request, &cancel)
                .await
                .with_context(|| format!("Failed to apply patch in {}", repo.display()))?;

            if let Some(name) = target_ref {
                let full = store
                    .update_ref(&name, commit)
                    .await
                    .with_context(|| format!("Failed to update {}", name))?;
                info!("Updated {} to {}", full, commit);
            }

            println!("{}", commit);
        }

        Commands::InitConfig { path } => init_config(&path)?,
    }

    Ok(())
}
