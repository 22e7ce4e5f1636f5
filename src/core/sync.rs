//! Sync mode and teardown
//!
//! A sync-mode dependency is not packed. Instead a long-running helper
//! mirrors its source tree into the target's dependency folder until the
//! session stops it. Watchers share one cancellation token that is separate
//! from the build pipeline's, so cancelling a build leaves them running.

use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::builder::step_title;
use crate::core::inject::destination;
use crate::core::package::PackageNode;
use crate::core::session::Session;
use crate::core::step::StepResult;
use crate::error::BuildError;
use crate::infra::process::{ExecOutcome, ProcessTask};

/// Helper subcommand that mirrors a package and watches it
pub const SYNC_SUBCOMMAND: &str = "sync";

/// Helper subcommand that puts the original install back
pub const SYNC_RESTORE_SUBCOMMAND: &str = "sync-restore";

/// Helper subcommand that kills every process of a session
pub const KILL_ALL_SUBCOMMAND: &str = "kill-all";

/// How long a freshly started watcher is observed for early failure
const STARTUP_PROBE: Duration = Duration::from_millis(300);

#[derive(Debug)]
struct SyncWatcher {
    name: String,
    source: PathBuf,
    destination: PathBuf,
    backup: PathBuf,
    handle: JoinHandle<ExecOutcome>,
}

/// The running sync watchers of one session
#[derive(Debug)]
pub struct SyncSession {
    session: Session,
    cancel: CancellationToken,
    target: Option<PathBuf>,
    watchers: Vec<SyncWatcher>,
}

impl SyncSession {
    /// Create an empty sync session
    pub fn new(session: Session) -> Self {
        Self {
            session,
            cancel: CancellationToken::new(),
            target: None,
            watchers: Vec::new(),
        }
    }

    /// Token that stops every watcher of this session
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of watchers started and not yet stopped
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Whether no watcher was started
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Whether any watcher process is still running
    pub fn is_running(&self) -> bool {
        self.watchers.iter().any(|w| !w.handle.is_finished())
    }

    /// Start mirroring `dependency` into `target`
    pub async fn start(&mut self, dependency: &PackageNode, target: &PackageNode) -> StepResult {
        let title = step_title(dependency);
        if let Err(e) = dependency.ensure_identity().and(target.ensure_identity()) {
            return StepResult::from_error(title, &BuildError::from(e));
        }
        if self.cancel.is_cancelled() {
            return StepResult::aborted(title);
        }

        let cwd = target.cwd.as_path();
        let dest = destination(target, &dependency.name);
        let backup = self.session.dirs().sync_backup_dir(&dependency.name);
        let task = self
            .session
            .helper_task(
                cwd,
                SYNC_SUBCOMMAND,
                [
                    self.session.translate(cwd, &dependency.cwd),
                    self.session.translate(cwd, &dest),
                    self.session.translate(cwd, &backup),
                ],
            )
            .with_cancel(self.cancel.clone());

        let engine = self.session.engine().clone();
        let mut handle = tokio::spawn(async move { engine.execute(task).await });

        // A watcher that dies right away (bad path, missing helper) is reported now
        if let Ok(joined) = tokio::time::timeout(STARTUP_PROBE, &mut handle).await {
            let outcome = joined.unwrap_or_else(|e| {
                Err(crate::error::ExecError::Spawn {
                    command: SYNC_SUBCOMMAND.to_string(),
                    error: e.to_string(),
                })
            });
            return match outcome {
                Ok(_) => StepResult::failure(
                    title,
                    crate::error::ErrorKind::NonZeroExit,
                    "sync watcher exited immediately",
                ),
                Err(e) => StepResult::from_error(title, &BuildError::from(e)),
            };
        }

        info!(dependency = %dependency.name, target = %target.name, "sync started");
        self.target = Some(target.cwd.clone());
        self.watchers.push(SyncWatcher {
            name: dependency.name.clone(),
            source: dependency.cwd.clone(),
            destination: dest,
            backup,
            handle,
        });
        StepResult::success(title, format!("syncing into {}", target.name))
    }

    /// Working directories involved in this session
    pub fn cwds(&self) -> Vec<PathBuf> {
        self.target
            .iter()
            .cloned()
            .chain(self.watchers.iter().map(|w| w.source.clone()))
            .collect()
    }

    /// Signal every watcher to terminate without waiting
    pub fn signal_stop(&self) {
        self.cancel.cancel();
    }

    /// Stop every watcher and restore the original installs
    pub async fn stop(&mut self) -> Vec<StepResult> {
        self.cancel.cancel();
        let mut results = Vec::with_capacity(self.watchers.len());

        for watcher in self.watchers.drain(..) {
            match watcher.handle.await {
                Ok(Err(e)) if !e.is_aborted() => {
                    warn!(dependency = %watcher.name, "sync watcher failed: {e}");
                }
                Ok(_) => {}
                Err(e) => warn!(dependency = %watcher.name, "sync watcher task failed: {e}"),
            }

            let cwd = self
                .target
                .clone()
                .unwrap_or_else(|| watcher.source.clone());
            let task = self.session.helper_task(
                &cwd,
                SYNC_RESTORE_SUBCOMMAND,
                [
                    self.session.translate(&cwd, &watcher.backup),
                    self.session.translate(&cwd, &watcher.destination),
                ],
            );
            results.push(match self.session.engine().execute(task).await {
                Ok(_) => StepResult::success(&watcher.name, "sync stopped"),
                Err(e) => StepResult::from_error(&watcher.name, &BuildError::from(e)),
            });
        }

        results
    }
}

/// Best-effort cleanup of everything a session spawned
///
/// Signals the sync watchers, then runs the helper's kill-all over the
/// session marker scoped to `cwds`. Never fails and does not wait for the
/// helper; the returned handle lets a caller that is about to exit do so.
pub fn teardown(
    session: &Session,
    sync: Option<&SyncSession>,
    cwds: &[PathBuf],
) -> Option<JoinHandle<()>> {
    if let Some(sync) = sync {
        sync.signal_stop();
    }

    let Some(first) = cwds.first() else {
        debug!("teardown: nothing to clean");
        return None;
    };

    let args: Vec<String> = cwds.iter().map(|cwd| session.translate(first, cwd)).collect();
    let task: ProcessTask = session
        .helper_task(first, KILL_ALL_SUBCOMMAND, args)
        .ignore_stderr_errors();
    let engine = session.engine().clone();
    Some(tokio::spawn(async move {
        if let Err(e) = engine.execute(task).await {
            debug!("teardown kill-all failed: {e}");
        }
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::infra::dirs::LocalpackDirs;
    use crate::infra::process::{EngineConfig, ProcessEngine};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn package(dir: &Path, name: &str) -> PackageNode {
        std::fs::create_dir_all(dir).unwrap();
        PackageNode {
            cwd: dir.to_path_buf(),
            name: name.into(),
            version: "1.0.0".into(),
            is_valid_package: true,
            ..PackageNode::default()
        }
    }

    fn session(root: &Path, helper_body: &str) -> Session {
        let helper = root.join("helper.sh");
        std::fs::write(&helper, format!("#!/bin/sh\n{helper_body}\n")).unwrap();
        std::fs::set_permissions(&helper, std::fs::Permissions::from_mode(0o755)).unwrap();
        let engine = ProcessEngine::with_config(EngineConfig {
            exit_grace: Duration::from_millis(50),
            ..EngineConfig::default()
        });
        Session::new(engine, LocalpackDirs::new().with_tmp_dir(root.join("tmp"))).with_helper(helper)
    }

    #[tokio::test]
    async fn test_start_then_stop_runs_restore() {
        let root = TempDir::new().unwrap();
        let log = root.path().join("calls.log");
        let body = format!(
            "echo \"$1\" >> '{}'\nif [ \"$1\" = sync ]; then exec sleep 30; fi",
            log.display()
        );
        let session = session(root.path(), &body);
        let mut sync = SyncSession::new(session);

        let step = sync
            .start(&package(&root.path().join("lib"), "lib"), &package(&root.path().join("app"), "app"))
            .await;
        assert!(!step.is_error(), "{step:?}");
        assert!(sync.is_running());
        assert_eq!(sync.cwds().len(), 2);

        let stopped = sync.stop().await;
        assert_eq!(stopped.len(), 1);
        assert!(!stopped[0].is_error(), "{:?}", stopped[0]);
        assert!(sync.is_empty());

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["sync", "sync-restore"]);
    }

    #[tokio::test]
    async fn test_watcher_dying_at_start_is_an_error() {
        let root = TempDir::new().unwrap();
        let session = session(root.path(), "echo 'error: cannot watch' >&2; exit 2");
        let mut sync = SyncSession::new(session);

        let step = sync
            .start(&package(&root.path().join("lib"), "lib"), &package(&root.path().join("app"), "app"))
            .await;
        assert!(step.is_error());
        assert!(sync.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_dependency_is_rejected() {
        let root = TempDir::new().unwrap();
        let mut sync = SyncSession::new(session(root.path(), "exit 0"));

        let step = sync
            .start(&PackageNode::default(), &package(&root.path().join("app"), "app"))
            .await;
        assert_eq!(
            step.error.unwrap().kind,
            crate::error::ErrorKind::MissingIdentity
        );
    }

    #[tokio::test]
    async fn test_teardown_runs_kill_all_with_marker() {
        let root = TempDir::new().unwrap();
        let log = root.path().join("kill.log");
        let body = format!("echo \"$@\" > '{}'", log.display());
        let session = session(root.path(), &body);
        let app = root.path().join("app");
        std::fs::create_dir_all(&app).unwrap();

        let handle = teardown(&session, None, &[app.clone()]).unwrap();
        handle.await.unwrap();

        let args = std::fs::read_to_string(&log).unwrap();
        assert!(args.starts_with("kill-all --session"));
        assert!(args.contains(session.marker()));
        assert!(args.trim_end().ends_with(&*app.to_string_lossy()));
    }

    #[tokio::test]
    async fn test_teardown_without_cwds_is_noop() {
        let root = TempDir::new().unwrap();
        let session = session(root.path(), "exit 0");
        assert!(teardown(&session, None, &[]).is_none());
        assert_eq!(session.engine().spawn_count(), 0);
    }
}
