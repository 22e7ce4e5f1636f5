//! CLI command implementations
//!
//! Each command is implemented in its own submodule. The hidden helper
//! subcommands are what the pipeline runs through the process engine.

pub mod branch;
pub mod clean;
pub mod doctor;
pub mod helper;
pub mod init;
pub mod order;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::config::defaults::MANIFEST_FILE;
use crate::core::global_config::GlobalConfig;
use crate::core::manifest::Manifest;
use crate::core::session::Session;
use crate::infra::dirs::LocalpackDirs;
use crate::infra::process::ProcessEngine;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a localpack.toml in the current directory
    Init {
        /// Target package directory
        #[arg(short, long, default_value = ".")]
        target: String,

        /// Overwrite an existing manifest
        #[arg(short, long)]
        force: bool,
    },

    /// Print the order build-mode dependencies are built in
    Order,

    /// Build, inject and sync the manifest's dependencies
    Run,

    /// Show or switch the git branch of a package
    Branch {
        /// Package directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// List local branches
        #[arg(short, long)]
        list: bool,

        /// Fetch and pull before reading the branch
        #[arg(long)]
        pull: bool,

        /// Switch to this branch
        #[arg(long, value_name = "BRANCH")]
        checkout: Option<String>,
    },

    /// Check system dependencies
    Doctor,

    /// Kill leftover processes and remove staged artifacts
    Clean,

    /// Unpack an artifact and place it into a dependency folder
    #[command(hide = true)]
    Place {
        /// Marker of the session that started this helper
        #[arg(long)]
        session: String,
        /// Packed archive
        artifact: PathBuf,
        /// Scratch directory
        staging: PathBuf,
        /// Final location
        dest: PathBuf,
    },

    /// Mirror a package into a dependency folder and keep it in sync
    #[command(hide = true)]
    Sync {
        /// Marker of the session that started this helper
        #[arg(long)]
        session: String,
        /// Package root to mirror
        source: PathBuf,
        /// Destination inside the target's node_modules
        dest: PathBuf,
        /// Where the existing install is kept
        backup: PathBuf,
    },

    /// Put a synced dependency's original install back
    #[command(hide = true)]
    SyncRestore {
        /// Marker of the session that started this helper
        #[arg(long)]
        session: String,
        /// Saved install
        backup: PathBuf,
        /// Destination inside the target's node_modules
        dest: PathBuf,
    },

    /// Kill every process of a session
    #[command(hide = true)]
    KillAll {
        /// Marker of the session to reap
        #[arg(long)]
        session: String,
        /// Working directories the session used
        cwds: Vec<PathBuf>,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        match self {
            Self::Init { target, force } => {
                let current_dir = std::env::current_dir()?;
                init::execute(&current_dir, &target, force).await
            }
            Self::Order => {
                let current_dir = std::env::current_dir()?;
                order::execute(&current_dir).await
            }
            Self::Run => {
                let current_dir = std::env::current_dir()?;
                run::execute(&current_dir).await
            }
            Self::Branch {
                path,
                list,
                pull,
                checkout,
            } => branch::execute(&path, list, pull, checkout.as_deref()).await,
            Self::Doctor => {
                let current_dir = std::env::current_dir().ok();
                doctor::execute(current_dir.as_deref()).await
            }
            Self::Clean => {
                let current_dir = std::env::current_dir()?;
                clean::execute(&current_dir).await
            }
            Self::Place {
                session,
                artifact,
                staging,
                dest,
            } => helper::place(&session, &artifact, &staging, &dest),
            Self::Sync {
                session,
                source,
                dest,
                backup,
            } => {
                // The watch loop blocks until the process is killed
                tokio::task::spawn_blocking(move || helper::sync(&session, &source, &dest, &backup))
                    .await?
            }
            Self::SyncRestore {
                session,
                backup,
                dest,
            } => helper::sync_restore(&session, &backup, &dest),
            Self::KillAll { session, cwds } => helper::kill_all(&session, &cwds),
        }
    }
}

/// Load `localpack.toml` from `dir`
pub(crate) fn load_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    Manifest::load(&path).with_context(|| format!("Cannot use {}", path.display()))
}

/// Directory layout with the global config applied
pub(crate) fn app_dirs() -> Result<LocalpackDirs> {
    let dirs = LocalpackDirs::new();
    let config = GlobalConfig::load(&dirs).context("Failed to load global configuration")?;
    Ok(config.apply_to(dirs))
}

/// A fresh session for one command run
pub(crate) fn app_session() -> Result<Session> {
    Ok(Session::new(ProcessEngine::new(), app_dirs()?))
}
