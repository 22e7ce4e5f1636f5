//! CLI implementation for `localpack clean` command
//!
//! Reaps processes left by an earlier session in the manifest's package
//! directories and removes staged artifacts. Sync backups are kept, since
//! they hold the original installs.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::commands::{app_dirs, load_manifest};
use crate::cli::output::{is_json, print_detail, print_json, print_success};
use crate::config::defaults::SESSION_MARKER_PREFIX;
use crate::infra::filesystem;
use crate::infra::reaper;

/// Execute the clean command
pub async fn execute(path: &Path) -> Result<()> {
    let manifest = load_manifest(path)?;
    let mut cwds = vec![manifest.target_path(path)];
    cwds.extend(manifest.dependency_paths(path));

    // Any session's marker shares the prefix; scope by the manifest's directories
    let killed = tokio::task::spawn_blocking(move || {
        reaper::kill_session(SESSION_MARKER_PREFIX, &cwds)
    })
    .await?;

    let dirs = app_dirs()?;
    let staging = dirs.staging_root();
    let removed = staging.exists();
    filesystem::remove_dir_all(&staging)
        .with_context(|| format!("Failed to remove {}", staging.display()))?;

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "killed": killed,
            "staging_removed": removed,
        }));
        return Ok(());
    }

    print_success("Cleaned");
    print_detail(&format!("Killed {killed} leftover process(es)"));
    if removed {
        print_detail(&format!("Removed {}", staging.display()));
    }
    Ok(())
}
