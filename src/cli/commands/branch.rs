//! CLI implementation for `localpack branch` command

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{is_json, print_detail, print_json, print_success};
use crate::infra::git::GitClient;
use crate::infra::process::ProcessEngine;

/// Execute the branch command
pub async fn execute(path: &Path, list: bool, pull: bool, checkout: Option<&str>) -> Result<()> {
    let git = GitClient::new(ProcessEngine::new());

    if let Some(branch) = checkout {
        git.checkout(path, branch)
            .await
            .with_context(|| format!("Failed to switch to '{branch}'"))?;
        print_success(&format!("Switched to {branch}"));
    }

    if pull {
        git.fetch(path).await.context("Failed to fetch")?;
        git.pull(path).await.context("Failed to pull")?;
        print_success("Pulled latest changes");
    }

    let current = git.current_branch(path).await?;
    let branches = if list {
        git.branches(path).await?
    } else {
        Vec::new()
    };

    if is_json() {
        print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "branch": current,
            "branches": branches,
        }));
        return Ok(());
    }

    println!("{current}");
    for branch in branches.iter().filter(|b| **b != current) {
        print_detail(branch);
    }
    Ok(())
}
