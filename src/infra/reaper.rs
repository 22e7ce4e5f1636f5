//! Session process reaper
//!
//! Finds and kills processes left behind by a session: anything whose
//! command line carries the session marker and whose working directory lies
//! under one of the session's package directories.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// A process matched for termination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProcess {
    /// Process id
    pub pid: u32,
    /// Working directory, when readable
    pub cwd: Option<PathBuf>,
}

/// Whether a process belongs to the session
///
/// The marker must appear in the command line. When `cwds` is non-empty the
/// process must also run inside one of them; an unreadable working
/// directory counts as a match since the marker is already specific.
pub fn matches_session(cmdline: &str, cwd: Option<&Path>, marker: &str, cwds: &[PathBuf]) -> bool {
    if marker.is_empty() || !cmdline.contains(marker) {
        return false;
    }
    match cwd {
        Some(cwd) if !cwds.is_empty() => cwds.iter().any(|root| cwd.starts_with(root)),
        _ => true,
    }
}

/// Processes other than this one (and its parent) that belong to the session
#[cfg(target_os = "linux")]
pub fn find_session_processes(marker: &str, cwds: &[PathBuf]) -> Vec<SessionProcess> {
    let own = std::process::id();
    let parent = std::os::unix::process::parent_id();

    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
            if pid == own || pid == parent {
                return None;
            }
            let raw = std::fs::read(entry.path().join("cmdline")).ok()?;
            let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
            let cwd = std::fs::read_link(entry.path().join("cwd")).ok();
            matches_session(&cmdline, cwd.as_deref(), marker, cwds)
                .then_some(SessionProcess { pid, cwd })
        })
        .collect()
}

/// Kill every process of the session, returning how many were signalled
pub fn kill_session(marker: &str, cwds: &[PathBuf]) -> usize {
    #[cfg(target_os = "linux")]
    {
        let found = find_session_processes(marker, cwds);
        let mut killed = 0;
        for process in &found {
            debug!(pid = process.pid, cwd = ?process.cwd, "killing session process");
            if signal(process.pid) {
                killed += 1;
            }
        }
        info!(marker, killed, "session processes reaped");
        killed
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = cwds;
        kill_by_pattern(marker)
    }
}

#[cfg(target_os = "linux")]
fn signal(pid: u32) -> bool {
    Command::new("kill")
        .args(["-KILL", "--", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(not(target_os = "linux"))]
fn kill_by_pattern(marker: &str) -> usize {
    if cfg!(windows) {
        debug!(marker, "no pattern kill on this platform");
        return 0;
    }
    let status = Command::new("pkill")
        .args(["-KILL", "-f", marker])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(s) if s.success() => {
            info!(marker, "session processes reaped");
            1
        }
        Ok(_) => 0,
        Err(e) => {
            debug!("pkill unavailable: {e}");
            0
        }
    }
}
