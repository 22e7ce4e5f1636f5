//! Git operations
//!
//! Thin client over the `git` executable, driven through the process engine
//! so every invocation is deduplicated, cancellable and logged like any
//! other external command.

use backoff::backoff::Constant;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::defaults::{BRANCH_READ_ATTEMPTS, BRANCH_READ_BACKOFF};
use crate::error::{ExecError, GitError};
use crate::infra::process::{ProcessEngine, ProcessTask};

const GIT: &str = "git";

/// Git client bound to one process engine
#[derive(Debug, Clone)]
pub struct GitClient {
    engine: ProcessEngine,
    cancel: CancellationToken,
    branch_attempts: u32,
    branch_backoff: Duration,
}

impl GitClient {
    /// Create a client with the default branch-read retry policy
    pub fn new(engine: ProcessEngine) -> Self {
        Self {
            engine,
            cancel: CancellationToken::new(),
            branch_attempts: BRANCH_READ_ATTEMPTS,
            branch_backoff: BRANCH_READ_BACKOFF,
        }
    }

    /// Cancel every git command started by this client when `cancel` fires
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the branch-read retry policy
    #[must_use]
    pub fn with_branch_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.branch_attempts = attempts.max(1);
        self.branch_backoff = delay;
        self
    }

    /// Name of the checked-out branch
    ///
    /// Read failures are retried with a fixed delay; cancellation and a
    /// detached HEAD are reported immediately.
    pub async fn current_branch(&self, cwd: &Path) -> Result<String, GitError> {
        let attempts = &AtomicU32::new(0);
        let policy = Constant::new(self.branch_backoff);

        backoff::future::retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let task = self.task(cwd, ["symbolic-ref", "--short", "HEAD"]);
            match self.engine.execute(task).await {
                Ok(out) => {
                    let branch = out.trim();
                    if branch.is_empty() {
                        Err(backoff::Error::permanent(GitError::NoBranch {
                            cwd: cwd.to_path_buf(),
                        }))
                    } else {
                        Ok(branch.to_string())
                    }
                }
                Err(e) if is_detached_head(&e) => Err(backoff::Error::permanent(GitError::NoBranch {
                    cwd: cwd.to_path_buf(),
                })),
                Err(e) if e.is_aborted() || attempt >= self.branch_attempts => {
                    Err(backoff::Error::permanent(command_error(cwd, e)))
                }
                Err(e) => {
                    debug!(attempt, cwd = %cwd.display(), "branch read failed, retrying: {e}");
                    Err(backoff::Error::transient(command_error(cwd, e)))
                }
            }
        })
        .await
    }

    /// Local branch names
    pub async fn branches(&self, cwd: &Path) -> Result<Vec<String>, GitError> {
        let out = self
            .run(cwd, ["branch", "--list", "--format=%(refname:short)"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Fetch all remotes
    pub async fn fetch(&self, cwd: &Path) -> Result<(), GitError> {
        self.run(cwd, ["fetch", "--all", "--prune"]).await.map(drop)
    }

    /// Pull the current branch
    pub async fn pull(&self, cwd: &Path) -> Result<(), GitError> {
        self.run(cwd, ["pull"]).await.map(drop)
    }

    /// Switch to `branch`
    pub async fn checkout(&self, cwd: &Path, branch: &str) -> Result<(), GitError> {
        self.run(cwd, ["checkout", branch]).await.map(drop)
    }

    async fn run<const N: usize>(&self, cwd: &Path, args: [&str; N]) -> Result<String, GitError> {
        self.engine
            .execute(self.task(cwd, args))
            .await
            .map_err(|e| command_error(cwd, e))
    }

    fn task<const N: usize>(&self, cwd: &Path, args: [&str; N]) -> ProcessTask {
        ProcessTask::new(GIT, cwd)
            .args(args)
            .with_cancel(self.cancel.clone())
    }
}

/// `symbolic-ref` on a detached HEAD, which no retry can fix
fn is_detached_head(err: &ExecError) -> bool {
    matches!(err, ExecError::Classified { line, .. } if line.contains("is not a symbolic ref"))
}

fn command_error(cwd: &Path, source: ExecError) -> GitError {
    GitError::Command {
        cwd: cwd.to_path_buf(),
        source,
    }
}
