//! Hidden helper subcommands
//!
//! The pipeline runs these through the process engine with the current
//! executable, so they behave like any other external program: output is
//! classified, a failure is a non-zero exit, and cancellation kills them.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::infra::{mirror, placement, reaper};

/// `place`: unpack an artifact and move it into place
pub fn place(session: &str, artifact: &Path, staging: &Path, dest: &Path) -> Result<()> {
    debug!(session, "place helper started");
    placement::place_artifact(artifact, staging, dest)
        .with_context(|| format!("Failed to place '{}'", artifact.display()))?;
    println!("placed {}", dest.display());
    Ok(())
}

/// `sync`: back up the current install, mirror, then watch until killed
pub fn sync(session: &str, source: &Path, dest: &Path, backup: &Path) -> Result<()> {
    debug!(session, "sync helper started");
    if mirror::backup_existing(dest, backup)? {
        info!("kept original install at '{}'", backup.display());
    }

    let stats = mirror::mirror(source, dest)
        .with_context(|| format!("Failed to mirror '{}'", source.display()))?;

    // Announce the pid so cancellation kills this process and not just the shell
    let mut stdout = std::io::stdout().lock();
    writeln!(
        stdout,
        "<<PID:{}>> mirrored {} file(s) into {}",
        std::process::id(),
        stats.copied,
        dest.display()
    )?;
    stdout.flush()?;
    drop(stdout);

    mirror::watch(source, dest, |stats| {
        println!("synced {} file(s), removed {}", stats.copied, stats.removed);
    })
    .with_context(|| format!("Failed to watch '{}'", source.display()))?;
    Ok(())
}

/// `sync-restore`: put the original install back
pub fn sync_restore(session: &str, backup: &Path, dest: &Path) -> Result<()> {
    debug!(session, "sync-restore helper started");
    let restored = mirror::restore(backup, dest)
        .with_context(|| format!("Failed to restore '{}'", dest.display()))?;
    if restored {
        println!("restored {}", dest.display());
    } else {
        println!("removed {}", dest.display());
    }
    Ok(())
}

/// `kill-all`: reap every process of the session
pub fn kill_all(session: &str, cwds: &[PathBuf]) -> Result<()> {
    let killed = reaper::kill_session(session, cwds);
    println!("killed {killed} process(es)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::filesystem;
    use tempfile::TempDir;

    #[test]
    fn test_sync_restore_without_backup_removes_mirror() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("node_modules/lib");
        filesystem::write_file(&dest.join("index.js"), "1").unwrap();

        sync_restore("m", &root.path().join("backup"), &dest).unwrap();
        assert!(!dest.exists());
    }

    #[test]
    fn test_sync_restore_puts_backup_back() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("node_modules/lib");
        let backup = root.path().join("backup/lib");
        filesystem::write_file(&dest.join("index.js"), "mirrored").unwrap();
        filesystem::write_file(&backup.join("index.js"), "original").unwrap();

        sync_restore("m", &backup, &dest).unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.join("index.js")).unwrap(),
            "original"
        );
        assert!(!backup.exists());
    }

    #[test]
    fn test_place_reports_missing_archive() {
        let root = TempDir::new().unwrap();
        let err = place(
            "m",
            &root.path().join("missing.tgz"),
            &root.path().join("staging"),
            &root.path().join("dest"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to place"));
    }

    #[test]
    fn test_kill_all_with_unknown_marker_succeeds() {
        assert!(kill_all("localpack-session-no-such-marker", &[]).is_ok());
    }
}
