//! Error types for localpack
//!
//! Domain-specific error types using thiserror.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Classification of a failed pipeline step
///
/// Every error surfaced to the caller maps onto exactly one kind, so a
/// renderer can decide how to present it without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The external process could not start
    SpawnFailure,
    /// Cancellation was observed before or during a step
    Aborted,
    /// A stderr line matched a fatal pattern
    ClassifiedError,
    /// The process finished with a failure code
    NonZeroExit,
    /// Package metadata could not be read or parsed
    MetadataParseError,
    /// The build succeeded but no packed artifact was found
    ArtifactNotFound,
    /// A package has no name, version or working directory
    MissingIdentity,
    /// The selected packages depend on each other in a cycle
    CircularDependency,
    /// A local filesystem operation failed
    Filesystem,
}

impl ErrorKind {
    /// Short machine-friendly label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpawnFailure => "spawn_failure",
            Self::Aborted => "aborted",
            Self::ClassifiedError => "classified_error",
            Self::NonZeroExit => "non_zero_exit",
            Self::MetadataParseError => "metadata_parse_error",
            Self::ArtifactNotFound => "artifact_not_found",
            Self::MissingIdentity => "missing_identity",
            Self::CircularDependency => "circular_dependency",
            Self::Filesystem => "filesystem",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process execution errors
///
/// Cloneable because deduplicated callers share one outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Process could not be spawned
    #[error("Failed to start '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Process was cancelled
    #[error("aborted: '{command}' was cancelled")]
    Aborted { command: String },

    /// A stderr line matched a fatal pattern
    #[error("{line}")]
    Classified { command: String, line: String },

    /// Process finished unsuccessfully without a fatal stderr line
    #[error("'{command}' exited with {}{}", describe_code(*code), describe_stderr(stderr.as_deref()))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: Option<String>,
    },
}

fn describe_code(code: Option<i32>) -> String {
    code.map_or_else(|| "no exit code (terminated by signal)".to_string(), |c| format!("code {c}"))
}

fn describe_stderr(stderr: Option<&str>) -> String {
    stderr.map(|s| format!(": {s}")).unwrap_or_default()
}

impl ExecError {
    /// Error classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Spawn { .. } => ErrorKind::SpawnFailure,
            Self::Aborted { .. } => ErrorKind::Aborted,
            Self::Classified { .. } => ErrorKind::ClassifiedError,
            Self::NonZeroExit { .. } => ErrorKind::NonZeroExit,
        }
    }

    /// Whether this error reports a cancellation
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Package metadata errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackageError {
    /// No package.json in the package directory
    #[error("No package.json found at '{path}'")]
    MetadataNotFound { path: PathBuf },

    /// package.json exists but is not valid structured data
    #[error("Failed to parse '{path}': {error}")]
    MetadataParse { path: PathBuf, error: String },

    /// Failed to write package.json
    #[error("Failed to write '{path}': {error}")]
    MetadataWrite { path: PathBuf, error: String },

    /// Package lacks a name, version or working directory
    #[error("Package at '{cwd}' has no {field}")]
    MissingIdentity { cwd: PathBuf, field: &'static str },
}

impl PackageError {
    /// Error classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MetadataNotFound { .. } | Self::MetadataParse { .. } => {
                ErrorKind::MetadataParseError
            }
            Self::MetadataWrite { .. } => ErrorKind::Filesystem,
            Self::MissingIdentity { .. } => ErrorKind::MissingIdentity,
        }
    }
}

/// Dependency resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// Circular dependency detected
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Filesystem errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to copy a file or directory
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Failed to move a file or directory
    #[error("Failed to move '{from}' to '{to}': {error}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Build pipeline errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// No packed artifact in any candidate directory
    #[error("no built package for `{package}`")]
    ArtifactNotFound { package: String },

    /// Cancellation observed between steps
    #[error("aborted")]
    Aborted,

    /// Package metadata error
    #[error(transparent)]
    Package(#[from] PackageError),

    /// External process error
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Filesystem error
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Resolver error
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

impl BuildError {
    /// Error classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
            Self::Aborted => ErrorKind::Aborted,
            Self::Package(e) => e.kind(),
            Self::Exec(e) => e.kind(),
            Self::Filesystem(_) => ErrorKind::Filesystem,
            Self::Resolver(_) => ErrorKind::CircularDependency,
        }
    }
}

/// Project manifest errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest not found
    #[error("Manifest not found at '{path}'. Run 'localpack init' to create one.")]
    NotFound { path: PathBuf },

    /// Failed to read the manifest
    #[error("Failed to read manifest '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Manifest is not valid TOML or misses required fields
    #[error("Failed to parse manifest '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Failed to write the manifest
    #[error("Failed to write manifest '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Placement collaborator errors
#[derive(Error, Debug)]
pub enum PlacementError {
    /// Archive could not be opened or unpacked
    #[error("Failed to unpack '{archive}': {error}")]
    Unpack { archive: PathBuf, error: String },

    /// Unpacked archive has no recognisable package root
    #[error("Archive unpacked into '{staging}' contains no package root")]
    MissingPackageRoot { staging: PathBuf },

    /// Filesystem error
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Sync mirror errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// The source directory could not be watched
    #[error("Failed to watch '{path}': {error}")]
    Watch { path: PathBuf, error: String },

    /// Filesystem error
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Git client errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    /// The git process failed
    #[error("git failed in '{cwd}': {source}")]
    Command { cwd: PathBuf, source: ExecError },

    /// Git printed no branch name
    #[error("No current branch in '{cwd}' (detached HEAD?)")]
    NoBranch { cwd: PathBuf },
}

/// Top-level localpack error type
#[derive(Error, Debug)]
pub enum LocalpackError {
    /// Manifest error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Package error
    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    /// Resolver error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Process error
    #[error("Process error: {0}")]
    Exec(#[from] ExecError),

    /// Git error
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// Placement error
    #[error("Placement error: {0}")]
    Placement(#[from] PlacementError),

    /// Sync error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}
