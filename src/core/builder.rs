//! Build orchestration logic
//!
//! Builds dependency packages one at a time, in resolved order:
//!
//! 1. write the marker version into the package's metadata,
//! 2. run its enabled scripts sequentially with the detected package manager,
//! 3. restore the original version (always, whatever happened before),
//! 4. locate the packed artifact by its deterministic name,
//! 5. inject it into the target.
//!
//! The first failure stops the whole run. Packages never build concurrently:
//! the version rewrite and the artifact lookup both touch shared files.

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::defaults::{
    ARTIFACT_DIRS, MARKER_VERSION, VERSION_RESTORE_ATTEMPTS, VERSION_RESTORE_DELAY,
};
use crate::core::inject::Injector;
use crate::core::manager::PackageManager;
use crate::core::package::{artifact_stem, read_version, write_version, DependencyPackage, PackageNode};
use crate::core::session::Session;
use crate::core::step::StepResult;
use crate::error::{BuildError, PackageError};
use crate::infra::filesystem;
use crate::infra::process::ProcessTask;

/// Search the candidate output directories for `file_name`
///
/// The first directory (in [`ARTIFACT_DIRS`] order) holding the file wins.
pub fn locate_artifact(cwd: &Path, file_name: &str) -> Option<PathBuf> {
    ARTIFACT_DIRS
        .iter()
        .map(|dir| cwd.join(dir).join(file_name))
        .find(|candidate| candidate.is_file())
}

/// Keeps a package's marker version on disk only as long as it is alive
///
/// [`restore`](Self::restore) puts the original version back, retrying a few
/// times. If the guard is dropped without a successful restore (the build
/// future was cancelled or restoring kept failing), the drop handler tries
/// once more synchronously.
#[derive(Debug)]
pub struct MarkerVersionGuard {
    cwd: PathBuf,
    original: String,
    restored: bool,
}

impl MarkerVersionGuard {
    /// Record the on-disk version of the package at `cwd` and replace it with `marker`
    pub fn inject(cwd: &Path, marker: &str) -> Result<Self, PackageError> {
        let original = read_version(cwd)?
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PackageError::MissingIdentity {
                cwd: cwd.to_path_buf(),
                field: "version",
            })?;
        write_version(cwd, marker)?;
        debug!(cwd = %cwd.display(), %original, marker, "marker version injected");
        Ok(Self {
            cwd: cwd.to_path_buf(),
            original,
            restored: false,
        })
    }

    /// Version found on disk before injection
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Write the original version back
    pub async fn restore(mut self) -> Result<(), PackageError> {
        let mut attempt = 1;
        loop {
            match write_version(&self.cwd, &self.original) {
                Ok(()) => {
                    self.restored = true;
                    debug!(cwd = %self.cwd.display(), version = %self.original, "version restored");
                    return Ok(());
                }
                Err(e) if attempt < VERSION_RESTORE_ATTEMPTS => {
                    warn!(attempt, "failed to restore version: {e}");
                    attempt += 1;
                    tokio::time::sleep(VERSION_RESTORE_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for MarkerVersionGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        match write_version(&self.cwd, &self.original) {
            Ok(()) => debug!(cwd = %self.cwd.display(), "version restored on drop"),
            Err(e) => error!(
                "package at '{}' still carries the marker version: {e}",
                self.cwd.display()
            ),
        }
    }
}

/// Drives the per-package build state machine
#[derive(Debug, Clone)]
pub struct BuildOrchestrator {
    session: Session,
    cancel: CancellationToken,
    marker_version: String,
}

impl BuildOrchestrator {
    /// Create an orchestrator for a session
    pub fn new(session: Session) -> Self {
        Self {
            session,
            cancel: CancellationToken::new(),
            marker_version: MARKER_VERSION.to_string(),
        }
    }

    /// Cancel the run when `cancel` fires
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use a different marker version
    #[must_use]
    pub fn with_marker_version(mut self, marker_version: impl Into<String>) -> Self {
        self.marker_version = marker_version.into();
        self
    }

    /// Marker version written during builds
    pub fn marker_version(&self) -> &str {
        &self.marker_version
    }

    /// Build and inject every package of `order` into `target`
    ///
    /// Returns one result per attempted package, in execution order. The
    /// first failure (or cancellation) ends the run.
    pub async fn build(&self, order: &[DependencyPackage], target: &PackageNode) -> Vec<StepResult> {
        let injector = Injector::new(self.session.clone());
        let mut results = Vec::with_capacity(order.len());

        for dep in order {
            let title = step_title(&dep.node);
            if self.cancel.is_cancelled() {
                results.push(StepResult::aborted(title));
                break;
            }

            let artifact = match self.build_artifact(dep).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    results.push(self.failure(title, &e));
                    break;
                }
            };

            let step = injector
                .inject(target, &artifact, &dep.node.name, &self.cancel)
                .await;
            let failed = step.is_error();
            results.push(step);
            if failed {
                break;
            }
        }

        results
    }

    /// Build one package and return the path of its artifact
    pub async fn build_artifact(&self, dep: &DependencyPackage) -> Result<PathBuf, BuildError> {
        let pkg = &dep.node;
        pkg.ensure_identity()?;
        if self.cancel.is_cancelled() {
            return Err(BuildError::Aborted);
        }

        let manager = PackageManager::detect(&pkg.cwd);
        info!(package = %pkg.name, %manager, "building");

        let guard = MarkerVersionGuard::inject(&pkg.cwd, &self.marker_version)?;
        let mut outcome = self.run_scripts(pkg, manager).await;
        if outcome.is_ok() && dep.pack {
            outcome = self.pack_if_missing(pkg, manager).await;
        }
        let restored = guard.restore().await;

        outcome?;
        restored?;

        let file_name = pkg.artifact_file_name(&self.marker_version);
        let artifact =
            locate_artifact(&pkg.cwd, &file_name).ok_or_else(|| BuildError::ArtifactNotFound {
                package: pkg.name.clone(),
            })?;
        info!(package = %pkg.name, "built '{}'", artifact.display());
        Ok(artifact)
    }

    async fn run_scripts(&self, pkg: &PackageNode, manager: PackageManager) -> Result<(), BuildError> {
        for script in pkg.runnable_scripts() {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Aborted);
            }
            let command = manager.script_command(&script.value, &pkg.declared_scripts);
            info!(package = %pkg.name, script = %script.name, "running '{command}'");
            self.session
                .engine()
                .execute(ProcessTask::new(command, &pkg.cwd).with_cancel(self.cancel.clone()))
                .await?;
        }
        Ok(())
    }

    /// Pack with the package manager unless the scripts already left an artifact
    async fn pack_if_missing(&self, pkg: &PackageNode, manager: PackageManager) -> Result<(), BuildError> {
        let file_name = pkg.artifact_file_name(&self.marker_version);
        if locate_artifact(&pkg.cwd, &file_name).is_some() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(BuildError::Aborted);
        }

        info!(package = %pkg.name, %manager, "packing");
        self.session
            .engine()
            .execute(
                ProcessTask::new(manager.pack_command(&file_name), &pkg.cwd)
                    .with_cancel(self.cancel.clone()),
            )
            .await?;

        normalise_packed(&pkg.cwd, manager, &pkg.name, &self.marker_version)?;
        Ok(())
    }

    fn failure(&self, title: String, err: &BuildError) -> StepResult {
        if self.cancel.is_cancelled() {
            StepResult::aborted(title)
        } else {
            StepResult::from_error(title, err)
        }
    }
}

/// Rename the archive a pack command produced to the deterministic artifact name
///
/// Returns the artifact path when one is present afterwards.
pub fn normalise_packed(
    cwd: &Path,
    manager: PackageManager,
    name: &str,
    version: &str,
) -> Result<Option<PathBuf>, BuildError> {
    let file_name = crate::core::package::artifact_file_name(name, version);
    let wanted = cwd.join(&file_name);
    let packed = cwd.join(manager.packed_file_name(&artifact_stem(name), version, &file_name));
    if packed != wanted && packed.is_file() {
        filesystem::move_path(&packed, &wanted)?;
    }
    Ok(wanted.is_file().then_some(wanted))
}

/// Package name, or its directory while the name is unresolved
pub fn step_title(pkg: &PackageNode) -> String {
    if pkg.name.is_empty() {
        pkg.cwd.display().to_string()
    } else {
        pkg.name.clone()
    }
}
