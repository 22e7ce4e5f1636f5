//! Build-and-inject pipeline
//!
//! Entry point used by the CLI: checks the dependency selection, builds and
//! injects the build-mode dependencies in resolved order, then starts the
//! sync-mode watchers.

use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::builder::{step_title, BuildOrchestrator};
use crate::core::package::{DependencyMode, DependencyPackage, PackageNode};
use crate::core::resolver::{resolve, DependencyGraph};
use crate::core::session::Session;
use crate::core::step::StepResult;
use crate::core::sync::{teardown, SyncSession};
use crate::error::{BuildError, ErrorKind, ResolverError};

/// Title of the step reporting a dependency cycle
const ORDER_STEP_TITLE: &str = "dependency order";

/// What the caller collected: one target and its local dependencies
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Package receiving the dependencies
    pub target: PackageNode,
    /// Local dependencies, in the order the user listed them
    pub dependencies: Vec<DependencyPackage>,
}

impl PipelineRequest {
    /// Every working directory the pipeline touches, target first
    pub fn cwds(&self) -> Vec<PathBuf> {
        std::iter::once(self.target.cwd.clone())
            .chain(self.dependencies.iter().map(|d| d.node.cwd.clone()))
            .collect()
    }

    fn with_mode(&self, mode: DependencyMode) -> Vec<DependencyPackage> {
        self.dependencies
            .iter()
            .filter(|d| d.mode == mode)
            .cloned()
            .collect()
    }
}

/// Everything one pipeline run produced
#[derive(Debug)]
pub struct PipelineReport {
    /// Step results in execution order
    pub steps: Vec<StepResult>,
    /// Running sync watchers, if any were started
    pub sync: Option<SyncSession>,
    /// Teardown started because the run was cancelled
    pub teardown: Option<JoinHandle<()>>,
}

impl PipelineReport {
    fn finished(steps: Vec<StepResult>) -> Self {
        Self {
            steps,
            sync: None,
            teardown: None,
        }
    }

    /// Whether any step failed
    pub fn has_errors(&self) -> bool {
        self.steps.iter().any(StepResult::is_error)
    }

    /// Whether the run was cancelled
    pub fn was_aborted(&self) -> bool {
        self.steps.iter().any(StepResult::is_aborted)
    }
}

/// Runs the whole pipeline for one request
#[derive(Debug, Clone)]
pub struct Pipeline {
    session: Session,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline for a session
    pub fn new(session: Session) -> Self {
        Self {
            session,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel the run when `cancel` fires
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reject dependency selections that depend on each other in a cycle
    pub fn check(request: &PipelineRequest) -> Result<(), ResolverError> {
        DependencyGraph::from_packages(&request.dependencies).check_acyclic()
    }

    /// Build-mode dependencies in build order
    pub fn build_order(request: &PipelineRequest) -> Vec<DependencyPackage> {
        resolve(request.with_mode(DependencyMode::Build))
    }

    /// Run the pipeline
    ///
    /// Cancellation stops the run at the next step boundary (or kills the
    /// running process) and triggers a teardown of the session's processes.
    pub async fn run(&self, request: &PipelineRequest) -> PipelineReport {
        let mut steps = Vec::new();
        let target = &request.target;

        if let Err(e) = target.ensure_identity() {
            steps.push(StepResult::from_error(step_title(target), &BuildError::from(e)));
            return PipelineReport::finished(steps);
        }

        if let Err(e) = Self::check(request) {
            warn!("{e}");
            steps.push(StepResult::failure(
                ORDER_STEP_TITLE,
                ErrorKind::CircularDependency,
                e.to_string(),
            ));
            return PipelineReport::finished(steps);
        }

        let order = Self::build_order(request);
        info!(
            order = ?order.iter().map(|d| d.node.name.as_str()).collect::<Vec<_>>(),
            "build order resolved"
        );
        let orchestrator = BuildOrchestrator::new(self.session.clone()).with_cancel(self.cancel.clone());
        steps.extend(orchestrator.build(&order, target).await);

        if steps.iter().any(StepResult::is_error) {
            return self.finish(request, steps, None);
        }

        let mut sync = SyncSession::new(self.session.clone());
        for dep in request.with_mode(DependencyMode::Sync) {
            if self.cancel.is_cancelled() {
                steps.push(StepResult::aborted(step_title(&dep.node)));
                break;
            }
            let step = sync.start(&dep.node, target).await;
            let failed = step.is_error();
            steps.push(step);
            if failed {
                steps.extend(sync.stop().await);
                break;
            }
        }

        let sync = (!sync.is_empty()).then_some(sync);
        self.finish(request, steps, sync)
    }

    fn finish(
        &self,
        request: &PipelineRequest,
        steps: Vec<StepResult>,
        sync: Option<SyncSession>,
    ) -> PipelineReport {
        let cleanup = if self.cancel.is_cancelled() {
            info!("pipeline cancelled, tearing down");
            teardown(&self.session, sync.as_ref(), &request.cwds())
        } else {
            None
        };
        PipelineReport {
            steps,
            sync,
            teardown: cleanup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::package::NamedScript;
    use crate::infra::dirs::LocalpackDirs;
    use crate::infra::process::{EngineConfig, ProcessEngine};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn node(name: &str, deps: &[&str]) -> PackageNode {
        PackageNode {
            cwd: PathBuf::from(format!("/work/{name}")),
            name: name.into(),
            version: "1.0.0".into(),
            is_valid_package: true,
            dependency_names: deps.iter().map(|d| (*d).to_string()).collect(),
            ..PackageNode::default()
        }
    }

    fn session(root: &Path) -> Session {
        let engine = ProcessEngine::with_config(EngineConfig {
            exit_grace: Duration::from_millis(50),
            ..EngineConfig::default()
        });
        Session::new(engine, LocalpackDirs::new().with_tmp_dir(root))
    }

    #[test]
    fn test_build_order_excludes_sync_dependencies() {
        let request = PipelineRequest {
            target: node("app", &["a", "b"]),
            dependencies: vec![
                DependencyPackage::build(node("a", &["b"])),
                DependencyPackage::sync(node("s", &[])),
                DependencyPackage::build(node("b", &[])),
            ],
        };
        let order: Vec<String> = Pipeline::build_order(&request)
            .into_iter()
            .map(|d| d.node.name)
            .collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_cwds_start_with_target() {
        let request = PipelineRequest {
            target: node("app", &[]),
            dependencies: vec![DependencyPackage::build(node("a", &[]))],
        };
        assert_eq!(
            request.cwds(),
            vec![PathBuf::from("/work/app"), PathBuf::from("/work/a")]
        );
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_building() {
        let root = TempDir::new().unwrap();
        let session = session(root.path());
        let request = PipelineRequest {
            target: node("app", &[]),
            dependencies: vec![
                DependencyPackage::build(node("a", &["b"]).with_scripts(vec![NamedScript::new(
                    1, "build", "touch built",
                )])),
                DependencyPackage::build(node("b", &["a"])),
            ],
        };

        let report = Pipeline::new(session.clone()).run(&request).await;

        assert_eq!(report.steps.len(), 1);
        let error = report.steps[0].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::CircularDependency);
        assert_eq!(error.message, "Circular dependency detected: a -> b -> a");
        assert_eq!(session.engine().spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_unresolved_target_is_reported() {
        let root = TempDir::new().unwrap();
        let request = PipelineRequest {
            target: PackageNode::default(),
            dependencies: Vec::new(),
        };
        let report = Pipeline::new(session(root.path())).run(&request).await;
        assert!(report.has_errors());
        assert_eq!(
            report.steps[0].error.as_ref().unwrap().kind,
            ErrorKind::MissingIdentity
        );
    }

    #[tokio::test]
    async fn test_empty_selection_succeeds_without_steps() {
        let root = TempDir::new().unwrap();
        let request = PipelineRequest {
            target: node("app", &[]),
            dependencies: Vec::new(),
        };
        let report = Pipeline::new(session(root.path())).run(&request).await;
        assert!(report.steps.is_empty());
        assert!(report.sync.is_none());
    }
}
