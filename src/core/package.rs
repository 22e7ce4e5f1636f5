//! Package metadata model
//!
//! A [`PackageNode`] describes one local package directory: its identity as
//! declared in `package.json`, the scripts the user wants run for it, and the
//! names of the packages it depends on. Only the `version` field is ever
//! written back, and only through [`write_version`].

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Serializer, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::defaults::{ARTIFACT_EXTENSION, PACKAGE_FILE};
use crate::error::PackageError;
use crate::infra::filesystem;

/// Indentation used when a metadata file gives no hint
const DEFAULT_INDENT: &str = "  ";

/// One user-configured script slot
///
/// Identity is `id`, which stays stable when `name` or `value` change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedScript {
    /// Stable identifier of the slot
    pub id: u32,
    /// Display name
    pub name: String,
    /// Command or package.json script name
    pub value: String,
    /// Skip this script
    #[serde(default)]
    pub disabled: bool,
}

impl NamedScript {
    /// Create an enabled script
    pub fn new(id: u32, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            value: value.into(),
            disabled: false,
        }
    }

    /// Enabled and non-empty
    pub fn is_runnable(&self) -> bool {
        !self.disabled && !self.value.trim().is_empty()
    }
}

/// The parts of `package.json` the pipeline reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    /// Package name
    #[serde(default)]
    pub name: Option<String>,
    /// Package version
    #[serde(default)]
    pub version: Option<String>,
    /// Declared scripts
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    /// Production dependencies
    #[serde(default)]
    pub dependencies: Map<String, Value>,
    /// Development dependencies
    #[serde(default)]
    pub dev_dependencies: Map<String, Value>,
    /// Peer dependencies
    #[serde(default)]
    pub peer_dependencies: Map<String, Value>,
}

impl PackageMetadata {
    /// Names of all declared dependencies (production, dev, peer), deduplicated
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self
            .dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .chain(self.peer_dependencies.keys())
        {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

/// A local package selected by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageNode {
    /// Package root directory
    pub cwd: PathBuf,
    /// Name from package.json; empty until resolved
    pub name: String,
    /// Version from package.json; empty until resolved
    pub version: String,
    /// Scripts to run, in order
    pub scripts: Vec<NamedScript>,
    /// Whether package.json exists and parses
    pub is_valid_package: bool,
    /// Declared dependency names
    pub dependency_names: Vec<String>,
    /// Scripts declared in package.json (name -> command)
    pub declared_scripts: BTreeMap<String, String>,
}

impl PackageNode {
    /// Read the package at `cwd`
    ///
    /// Never fails: unreadable metadata leaves the node unresolved with
    /// `is_valid_package` unset.
    pub fn load(cwd: impl Into<PathBuf>) -> Self {
        let mut node = Self {
            cwd: cwd.into(),
            ..Self::default()
        };
        node.reload();
        node
    }

    /// Attach the scripts to run
    #[must_use]
    pub fn with_scripts(mut self, scripts: Vec<NamedScript>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Point the node at another directory and re-read its metadata
    pub fn set_cwd(&mut self, cwd: impl Into<PathBuf>) {
        self.cwd = cwd.into();
        self.reload();
    }

    /// Re-read metadata from disk, keeping the configured scripts
    pub fn reload(&mut self) {
        match read_metadata(&self.cwd) {
            Ok(meta) => {
                self.name = meta.name.clone().unwrap_or_default();
                self.version = meta.version.clone().unwrap_or_default();
                self.dependency_names = meta.dependency_names();
                self.declared_scripts = meta.scripts;
                self.is_valid_package = true;
            }
            Err(e) => {
                debug!("package at '{}' unresolved: {e}", self.cwd.display());
                self.name.clear();
                self.version.clear();
                self.dependency_names.clear();
                self.declared_scripts.clear();
                self.is_valid_package = false;
            }
        }
    }

    /// Path of the package's metadata file
    pub fn metadata_path(&self) -> PathBuf {
        self.cwd.join(PACKAGE_FILE)
    }

    /// Check that the package has everything a build needs
    pub fn ensure_identity(&self) -> Result<(), PackageError> {
        let missing = if self.cwd.as_os_str().is_empty() {
            Some("working directory")
        } else if self.name.trim().is_empty() {
            Some("name")
        } else if self.version.trim().is_empty() {
            Some("version")
        } else {
            None
        };
        match missing {
            Some(field) => Err(PackageError::MissingIdentity {
                cwd: self.cwd.clone(),
                field,
            }),
            None => Ok(()),
        }
    }

    /// Scripts that will actually run
    pub fn runnable_scripts(&self) -> impl Iterator<Item = &NamedScript> {
        self.scripts.iter().filter(|s| s.is_runnable())
    }

    /// File name of the archive packed at `version`
    pub fn artifact_file_name(&self, version: &str) -> String {
        artifact_file_name(&self.name, version)
    }
}

impl AsRef<PackageNode> for PackageNode {
    fn as_ref(&self) -> &PackageNode {
        self
    }
}

/// How a dependency reaches the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyMode {
    /// Build, pack and inject a static artifact
    #[default]
    Build,
    /// Continuously mirror the source tree
    Sync,
}

impl std::fmt::Display for DependencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build => f.write_str("build"),
            Self::Sync => f.write_str("sync"),
        }
    }
}

/// A dependency package together with how it is delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyPackage {
    /// The package
    pub node: PackageNode,
    /// Build or sync
    pub mode: DependencyMode,
    /// Run the package manager's pack command when the scripts leave no artifact
    pub pack: bool,
}

impl DependencyPackage {
    /// A build-mode dependency without a pack step
    pub fn build(node: PackageNode) -> Self {
        Self {
            node,
            mode: DependencyMode::Build,
            pack: false,
        }
    }

    /// A sync-mode dependency
    pub fn sync(node: PackageNode) -> Self {
        Self {
            node,
            mode: DependencyMode::Sync,
            pack: false,
        }
    }
}

impl AsRef<PackageNode> for DependencyPackage {
    fn as_ref(&self) -> &PackageNode {
        &self.node
    }
}

/// File-name stem package managers use for a package's archive
///
/// Scoped names lose the `@` and have their `/` replaced: `@acme/ui`
/// becomes `acme-ui`.
pub fn artifact_stem(name: &str) -> String {
    name.trim_start_matches('@').replace('/', "-")
}

/// `<stem>-v<version>.<ext>`
pub fn artifact_file_name(name: &str, version: &str) -> String {
    format!("{}-v{version}.{ARTIFACT_EXTENSION}", artifact_stem(name))
}

/// Read and parse `<cwd>/package.json`
pub fn read_metadata(cwd: &Path) -> Result<PackageMetadata, PackageError> {
    let path = cwd.join(PACKAGE_FILE);
    let content = read_metadata_text(&path)?;
    serde_json::from_str(&content).map_err(|e| PackageError::MetadataParse {
        path,
        error: e.to_string(),
    })
}

/// Current on-disk version, if any
pub fn read_version(cwd: &Path) -> Result<Option<String>, PackageError> {
    Ok(read_metadata(cwd)?.version)
}

/// Rewrite the `version` field of `<cwd>/package.json`
///
/// Every other field keeps its position, the file keeps its indentation
/// and its trailing newline.
pub fn write_version(cwd: &Path, version: &str) -> Result<(), PackageError> {
    let path = cwd.join(PACKAGE_FILE);
    let content = read_metadata_text(&path)?;
    let mut doc: Value = serde_json::from_str(&content).map_err(|e| PackageError::MetadataParse {
        path: path.clone(),
        error: e.to_string(),
    })?;

    let Some(fields) = doc.as_object_mut() else {
        return Err(PackageError::MetadataParse {
            path,
            error: "top-level value is not an object".to_string(),
        });
    };
    fields.insert("version".to_string(), Value::String(version.to_string()));

    let indent = detect_indent(&content);
    let mut out = Vec::with_capacity(content.len());
    let mut serializer =
        Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
    doc.serialize(&mut serializer)
        .map_err(|e| PackageError::MetadataWrite {
            path: path.clone(),
            error: e.to_string(),
        })?;

    let mut rendered = String::from_utf8_lossy(&out).into_owned();
    if content.ends_with('\n') {
        rendered.push('\n');
    }

    filesystem::write_file(&path, &rendered).map_err(|e| PackageError::MetadataWrite {
        path: path.clone(),
        error: e.to_string(),
    })?;
    debug!("set version of '{}' to {version}", path.display());
    Ok(())
}

fn read_metadata_text(path: &Path) -> Result<String, PackageError> {
    if !path.is_file() {
        return Err(PackageError::MetadataNotFound {
            path: path.to_path_buf(),
        });
    }
    filesystem::read_file(path).map_err(|e| PackageError::MetadataParse {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Leading whitespace of the first indented line
fn detect_indent(content: &str) -> String {
    content
        .lines()
        .skip(1)
        .map(|line| {
            line.chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .collect::<String>()
        })
        .find(|indent| !indent.is_empty())
        .unwrap_or_else(|| DEFAULT_INDENT.to_string())
}
