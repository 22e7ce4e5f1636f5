//! Injection engine
//!
//! Places a built artifact into the target's dependency folder. The unpack
//! and replace work happens in the helper program's `place` subcommand; this
//! module computes the paths, runs the helper and reports the outcome.

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::defaults::DEPENDENCY_FOLDER;
use crate::core::package::PackageNode;
use crate::core::session::Session;
use crate::core::step::StepResult;
use crate::error::BuildError;
use crate::infra::dirs::LocalpackDirs;

/// Helper subcommand that unpacks and places an artifact
pub const PLACE_SUBCOMMAND: &str = "place";

/// Paths involved in one injection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPlan {
    /// Packed archive
    pub artifact: PathBuf,
    /// Scratch directory the archive is unpacked into
    pub staging: PathBuf,
    /// Final location inside the target's dependency folder
    pub destination: PathBuf,
}

impl InjectionPlan {
    /// Compute the paths for injecting `dependency_name` into `target`
    pub fn new(
        dirs: &LocalpackDirs,
        target: &PackageNode,
        artifact: &Path,
        dependency_name: &str,
    ) -> Self {
        Self {
            artifact: artifact.to_path_buf(),
            staging: dirs.staging_dir(dependency_name),
            destination: destination(target, dependency_name),
        }
    }
}

/// `<target>/node_modules/<dependency>`
pub fn destination(target: &PackageNode, dependency_name: &str) -> PathBuf {
    target.cwd.join(DEPENDENCY_FOLDER).join(dependency_name)
}

/// Runs artifact placement for built dependencies
#[derive(Debug, Clone)]
pub struct Injector {
    session: Session,
}

impl Injector {
    /// Create an injector for a session
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Paths an injection would use
    pub fn plan(&self, target: &PackageNode, artifact: &Path, dependency_name: &str) -> InjectionPlan {
        InjectionPlan::new(self.session.dirs(), target, artifact, dependency_name)
    }

    /// Place `artifact` as `dependency_name` inside `target`
    pub async fn inject(
        &self,
        target: &PackageNode,
        artifact: &Path,
        dependency_name: &str,
        cancel: &CancellationToken,
    ) -> StepResult {
        if cancel.is_cancelled() {
            return StepResult::aborted(dependency_name);
        }
        if let Err(e) = target.ensure_identity() {
            return StepResult::from_error(dependency_name, &BuildError::from(e));
        }

        let plan = self.plan(target, artifact, dependency_name);
        let cwd = target.cwd.as_path();
        let task = self
            .session
            .helper_task(
                cwd,
                PLACE_SUBCOMMAND,
                [
                    self.session.translate(cwd, &plan.artifact),
                    self.session.translate(cwd, &plan.staging),
                    self.session.translate(cwd, &plan.destination),
                ],
            )
            .with_cancel(cancel.clone());

        match self.session.engine().execute(task).await {
            Ok(_) => {
                info!(
                    dependency = dependency_name,
                    target = %target.name,
                    "injected '{}'",
                    plan.artifact.display()
                );
                StepResult::success(dependency_name, format!("injected into {}", target.name))
            }
            Err(e) => StepResult::from_error(dependency_name, &BuildError::from(e)),
        }
    }
}
