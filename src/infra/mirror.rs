//! Directory mirroring for sync mode
//!
//! Keeps a dependency's installed copy inside the target's `node_modules`
//! in step with its source checkout. The original install is moved aside
//! before the first mirror pass and put back by [`restore`].

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::defaults::SYNC_IGNORED_DIRS;
use crate::error::{FilesystemError, SyncError};
use crate::infra::filesystem;

/// Events arriving within this window are folded into one mirror pass
const COALESCE_WINDOW: Duration = Duration::from_millis(50);

/// Counts from one mirror pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStats {
    /// Files written to the destination
    pub copied: usize,
    /// Files skipped because their content already matched
    pub unchanged: usize,
    /// Destination entries removed because the source no longer has them
    pub removed: usize,
}

/// Whether a path relative to the package root lies in an ignored directory
pub fn is_ignored(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| SYNC_IGNORED_DIRS.iter().any(|ignored| c.as_os_str() == *ignored))
}

/// Move an existing install at `dest` to `backup`
///
/// Only the first call keeps anything: when `backup` already exists the
/// original is considered saved and `dest` is left for the mirror to
/// overwrite. Returns whether a backup was made.
pub fn backup_existing(dest: &Path, backup: &Path) -> Result<bool, FilesystemError> {
    if !dest.exists() || backup.exists() {
        return Ok(false);
    }
    filesystem::move_path(dest, backup)?;
    debug!("moved '{}' aside to '{}'", dest.display(), backup.display());
    Ok(true)
}

/// Put the original install back, dropping the mirrored copy
///
/// Returns whether a backup was restored.
pub fn restore(backup: &Path, dest: &Path) -> Result<bool, FilesystemError> {
    filesystem::remove_dir_all(dest)?;
    if !backup.exists() {
        return Ok(false);
    }
    filesystem::move_path(backup, dest)?;
    info!("restored '{}'", dest.display());
    Ok(true)
}

/// SHA-256 of a file's content, hex encoded
pub fn file_digest(path: &Path) -> Result<String, FilesystemError> {
    let bytes = std::fs::read(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Copy every non-ignored file of `source` into `dest`
///
/// Files whose content is already identical are left alone, so watchers on
/// the destination only see real changes.
pub fn mirror(source: &Path, dest: &Path) -> Result<MirrorStats, FilesystemError> {
    let mut stats = MirrorStats::default();
    let walker = WalkDir::new(source).into_iter().filter_entry(|entry| {
        entry
            .path()
            .strip_prefix(source)
            .map_or(true, |relative| !is_ignored(relative))
    });

    for entry in walker {
        let entry = entry.map_err(|e| FilesystemError::ReadFile {
            path: source.to_path_buf(),
            error: e.to_string(),
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            filesystem::create_dir_all(&target)?;
            continue;
        }

        if target.is_file() && file_digest(&target)? == file_digest(entry.path())? {
            stats.unchanged += 1;
        } else {
            filesystem::copy_file(entry.path(), &target)?;
            stats.copied += 1;
        }
    }

    Ok(stats)
}

/// Remove the destination counterparts of source paths that no longer exist
fn prune(source: &Path, dest: &Path, changed: &[PathBuf]) -> Result<usize, FilesystemError> {
    let mut removed = 0;
    for path in changed.iter().filter(|p| !p.exists()) {
        let Ok(relative) = path.strip_prefix(source) else {
            continue;
        };
        if relative.as_os_str().is_empty() || is_ignored(relative) {
            continue;
        }
        let target = dest.join(relative);
        if target.is_dir() {
            filesystem::remove_dir_all(&target)?;
            removed += 1;
        } else if target.exists() {
            std::fs::remove_file(&target).map_err(|e| FilesystemError::WriteFile {
                path: target.clone(),
                error: e.to_string(),
            })?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn is_relevant(event: &Event, source: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| {
        p.strip_prefix(source)
            .map_or(false, |relative| !is_ignored(relative))
    })
}

/// Watch `source` and re-mirror into `dest` on every change
///
/// Blocks until the watcher shuts down. `on_pass` is called after each
/// mirror pass triggered by a change.
pub fn watch<F>(source: &Path, dest: &Path, mut on_pass: F) -> Result<(), SyncError>
where
    F: FnMut(&MirrorStats),
{
    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(tx, Config::default()).map_err(|e| {
        SyncError::Watch {
            path: source.to_path_buf(),
            error: e.to_string(),
        }
    })?;
    watcher
        .watch(source, RecursiveMode::Recursive)
        .map_err(|e| SyncError::Watch {
            path: source.to_path_buf(),
            error: e.to_string(),
        })?;
    info!("watching '{}'", source.display());

    while let Ok(first) = rx.recv() {
        let mut changed = Vec::new();
        let mut relevant = false;
        let mut pending = Some(first);

        while let Some(res) = pending.take() {
            match res {
                Ok(event) if is_relevant(&event, source) => {
                    relevant = true;
                    changed.extend(event.paths);
                }
                Ok(_) => {}
                Err(e) => warn!("watch error: {e}"),
            }
            pending = rx.recv_timeout(COALESCE_WINDOW).ok();
        }

        if !relevant {
            continue;
        }

        let removed = prune(source, dest, &changed)?;
        let mut stats = mirror(source, dest)?;
        stats.removed = removed;
        debug!(
            copied = stats.copied,
            removed = stats.removed,
            "mirrored '{}'",
            source.display()
        );
        on_pass(&stats);
    }

    Ok(())
}
