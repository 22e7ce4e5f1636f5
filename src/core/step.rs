//! Step results
//!
//! Every unit of pipeline work reports one [`StepResult`]. Results are
//! appended in execution order and returned to the caller for rendering.

use serde::Serialize;

use crate::error::{BuildError, ErrorKind};

/// Failure attached to a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepError {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

/// Outcome of one pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    /// What the step was about (usually a package name)
    pub title: String,
    /// Optional detail on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Present when the step failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

/// How long a notification for a step stays on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Auto-dismissed
    Success,
    /// Stays until acknowledged
    Error,
}

impl StepResult {
    /// Successful step
    pub fn success(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: Some(content.into()),
            error: None,
        }
    }

    /// Failed step
    pub fn failure(title: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: None,
            error: Some(StepError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Step interrupted by cancellation
    pub fn aborted(title: impl Into<String>) -> Self {
        Self::failure(title, ErrorKind::Aborted, "aborted")
    }

    /// Failed step from a build error
    pub fn from_error(title: impl Into<String>, err: &BuildError) -> Self {
        match err.kind() {
            ErrorKind::Aborted => Self::aborted(title),
            kind => Self::failure(title, kind, err.to_string()),
        }
    }

    /// Whether the step failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether the step was aborted
    pub fn is_aborted(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::Aborted)
    }

    /// Notification severity; errors are sticky
    pub fn severity(&self) -> Severity {
        if self.is_error() {
            Severity::Error
        } else {
            Severity::Success
        }
    }

    /// Whether the notification should stay until dismissed
    pub fn is_sticky(&self) -> bool {
        self.severity() == Severity::Error
    }
}
