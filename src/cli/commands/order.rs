//! CLI implementation for `localpack order` command
//!
//! Prints the order the manifest's build-mode dependencies would be built in.

use std::path::Path;

use anyhow::Result;

use crate::cli::commands::load_manifest;
use crate::cli::output::{is_json, is_quiet, print_json};
use crate::core::builder::step_title;
use crate::core::package::DependencyMode;
use crate::core::pipeline::Pipeline;
use crate::error::LocalpackError;

/// Execute the order command
pub async fn execute(path: &Path) -> Result<()> {
    let manifest = load_manifest(path)?;
    let request = manifest.into_request(path);
    Pipeline::check(&request).map_err(LocalpackError::from)?;

    let order: Vec<String> = Pipeline::build_order(&request)
        .iter()
        .map(|dep| step_title(&dep.node))
        .collect();
    let synced: Vec<String> = request
        .dependencies
        .iter()
        .filter(|dep| dep.mode == DependencyMode::Sync)
        .map(|dep| step_title(&dep.node))
        .collect();

    if is_json() {
        print_json(&serde_json::json!({
            "target": step_title(&request.target),
            "order": order,
            "sync": synced,
        }));
        return Ok(());
    }

    // The order is the output, so quiet mode prints bare names
    if is_quiet() {
        for name in &order {
            println!("{name}");
        }
        return Ok(());
    }

    println!("Build order for {}:", step_title(&request.target));
    if order.is_empty() {
        println!("  (no build-mode dependencies)");
    }
    for (i, name) in order.iter().enumerate() {
        println!("  {}. {name}", i + 1);
    }
    for name in &synced {
        println!("  - {name} (sync)");
    }

    Ok(())
}
