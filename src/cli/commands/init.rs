//! CLI implementation for `localpack init` command

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{is_json, print_detail, print_json, print_success, print_warning};
use crate::config::defaults::{MANIFEST_FILE, PACKAGE_FILE};
use crate::core::manifest::{resolve_path, Manifest};

/// Execute the init command
pub async fn execute(path: &Path, target: &str, force: bool) -> Result<()> {
    let manifest_path = path.join(MANIFEST_FILE);
    if manifest_path.exists() && !force {
        anyhow::bail!(
            "{} already exists in {}. Use --force to overwrite it.",
            MANIFEST_FILE,
            path.display()
        );
    }

    let manifest = Manifest::template(target);
    manifest
        .save(&manifest_path)
        .with_context(|| "Failed to write project manifest")?;

    let target_dir = resolve_path(path, target);
    let has_package = target_dir.join(PACKAGE_FILE).is_file();

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "manifest": manifest_path.display().to_string(),
            "target": target_dir.display().to_string(),
            "target_has_package": has_package,
        }));
        return Ok(());
    }

    print_success(&format!("Created {}", manifest_path.display()));
    print_detail(&format!("Target: {}", target_dir.display()));
    if !has_package {
        print_warning(&format!(
            "No {PACKAGE_FILE} in {}; point [target] at your consumer package",
            target_dir.display()
        ));
    }
    print_detail("Add [[dependencies]] entries, then run 'localpack run'");

    Ok(())
}
