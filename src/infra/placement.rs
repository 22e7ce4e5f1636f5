//! Artifact placement
//!
//! Unpacks a packed artifact into a staging directory and swaps the
//! unpacked package root into its final location. Runs inside the hidden
//! `place` subcommand so the injection engine can drive it like any other
//! external program.

use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, info};

use crate::config::defaults::PACKAGE_FILE;
use crate::error::PlacementError;
use crate::infra::filesystem;

/// Directory name package managers put inside packed archives
const PACKED_ROOT: &str = "package";

/// Unpack `archive` into `staging` and move its package root to `dest`
///
/// Any previous content of `staging` and `dest` is replaced.
pub fn place_artifact(archive: &Path, staging: &Path, dest: &Path) -> Result<(), PlacementError> {
    filesystem::remove_dir_all(staging)?;
    filesystem::create_dir_all(staging)?;

    unpack(archive, staging)?;
    let root = package_root(staging)?;
    debug!(
        "unpacked '{}' with package root '{}'",
        archive.display(),
        root.display()
    );

    filesystem::remove_dir_all(dest)?;
    filesystem::move_path(&root, dest)?;
    info!("placed '{}' at '{}'", archive.display(), dest.display());
    Ok(())
}

/// Extract a gzip tarball, keeping file modes
pub fn unpack(archive: &Path, into: &Path) -> Result<(), PlacementError> {
    let file = File::open(archive).map_err(|e| PlacementError::Unpack {
        archive: archive.to_path_buf(),
        error: e.to_string(),
    })?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    tarball.set_preserve_permissions(true);
    tarball.unpack(into).map_err(|e| PlacementError::Unpack {
        archive: archive.to_path_buf(),
        error: e.to_string(),
    })
}

/// Locate the unpacked package root
///
/// npm, yarn and pnpm all wrap the package in `package/`; archives made by
/// other tools may use a single differently named directory, or none.
fn package_root(staging: &Path) -> Result<PathBuf, PlacementError> {
    let conventional = staging.join(PACKED_ROOT);
    if conventional.is_dir() {
        return Ok(conventional);
    }

    if staging.join(PACKAGE_FILE).is_file() {
        return Ok(staging.to_path_buf());
    }

    let dirs: Vec<PathBuf> = std::fs::read_dir(staging)
        .map_err(|e| PlacementError::Unpack {
            archive: staging.to_path_buf(),
            error: e.to_string(),
        })?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();

    match dirs.as_slice() {
        [only] if only.join(PACKAGE_FILE).is_file() => Ok(only.clone()),
        _ => Err(PlacementError::MissingPackageRoot {
            staging: staging.to_path_buf(),
        }),
    }
}
