//! Project manifest (localpack.toml) parsing and validation
//!
//! The manifest names the target package and the local dependencies to
//! deliver into it. Paths may use `${VAR}` environment substitution and are
//! resolved against the manifest's directory.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::defaults::PACKAGE_FILE;
use crate::core::package::{DependencyMode, DependencyPackage, NamedScript, PackageNode};
use crate::core::pipeline::PipelineRequest;
use crate::error::ManifestError;

/// The project manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Package receiving the dependencies
    pub target: TargetEntry,

    /// Local dependencies, in the order they are listed
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
}

/// The `[target]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetEntry {
    /// Package root of the target
    pub path: String,
}

/// One `[[dependencies]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyEntry {
    /// Package root of the dependency
    pub path: String,

    /// Build (pack and inject) or sync (mirror)
    #[serde(default)]
    pub mode: DependencyMode,

    /// Run the package manager's pack command when the scripts leave no artifact
    #[serde(default)]
    pub pack: bool,

    /// Scripts run before locating the artifact
    #[serde(default)]
    pub scripts: Vec<ScriptEntry>,
}

/// One `[[dependencies.scripts]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptEntry {
    /// Stable id; assigned when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,

    /// Display name
    pub name: String,

    /// Command or package.json script name
    pub value: String,

    /// Skip this script
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern"))
}

/// Substitute `${VAR}` patterns with environment values
///
/// Unset variables expand to the empty string.
///
/// # Examples
/// ```
/// use localpack::core::manifest::substitute_env_vars;
///
/// std::env::set_var("LP_DOC_ROOT", "/work");
/// assert_eq!(substitute_env_vars("${LP_DOC_ROOT}/ui"), "/work/ui");
/// std::env::remove_var("LP_DOC_ROOT");
/// ```
pub fn substitute_env_vars(input: &str) -> String {
    env_var_pattern()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Resolve a manifest path against the manifest directory
pub fn resolve_path(base_dir: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(substitute_env_vars(raw));
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

/// Turn script entries into script slots
///
/// Explicit ids are kept. Entries without one get ids above the largest
/// explicit id, in listing order, so the result is the same on every load.
pub fn assign_script_ids(entries: &[ScriptEntry]) -> Vec<NamedScript> {
    let mut next = entries.iter().filter_map(|e| e.id).max().map_or(1, |max| max + 1);
    entries
        .iter()
        .map(|entry| {
            let id = entry.id.unwrap_or_else(|| {
                let id = next;
                next += 1;
                id
            });
            NamedScript {
                id,
                name: entry.name.clone(),
                value: entry.value.clone(),
                disabled: entry.disabled,
            }
        })
        .collect()
}

impl Manifest {
    /// A manifest with a target and no dependencies
    pub fn template(target: &str) -> Self {
        Self {
            target: TargetEntry {
                path: target.to_string(),
            },
            dependencies: Vec::new(),
        }
    }

    /// Load manifest from file path
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Write the manifest to `path`
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let write_error = |error: String| ManifestError::Write {
            path: path.to_path_buf(),
            error,
        };
        let content = self.to_toml().map_err(|e| write_error(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| write_error(e.to_string()))
    }

    /// Load manifest from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize manifest to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Resolved target root
    pub fn target_path(&self, base_dir: &Path) -> PathBuf {
        resolve_path(base_dir, &self.target.path)
    }

    /// Resolved dependency roots, in listing order
    pub fn dependency_paths(&self, base_dir: &Path) -> Vec<PathBuf> {
        self.dependencies
            .iter()
            .map(|d| resolve_path(base_dir, &d.path))
            .collect()
    }

    /// Read every listed package and build the pipeline input
    ///
    /// Packages whose metadata cannot be read are kept unresolved; the
    /// pipeline reports them when it reaches them.
    pub fn into_request(&self, base_dir: &Path) -> PipelineRequest {
        let target = PackageNode::load(self.target_path(base_dir));
        let dependencies = self
            .dependencies
            .iter()
            .map(|entry| DependencyPackage {
                node: PackageNode::load(resolve_path(base_dir, &entry.path))
                    .with_scripts(assign_script_ids(&entry.scripts)),
                mode: entry.mode,
                pack: entry.pack,
            })
            .collect();
        PipelineRequest {
            target,
            dependencies,
        }
    }

    /// Report every problem with the listed paths
    pub fn validate(&self, base_dir: &Path) -> Vec<String> {
        let mut issues = Vec::new();
        let target = self.target_path(base_dir);
        check_package_dir(&target, "target", &mut issues);

        let mut seen = HashSet::new();
        for path in self.dependency_paths(base_dir) {
            let label = format!("dependency '{}'", path.display());
            check_package_dir(&path, &label, &mut issues);
            if path == target {
                issues.push(format!("{label} is the target itself"));
            }
            if !seen.insert(path.clone()) {
                issues.push(format!("{label} is listed more than once"));
            }
        }
        issues
    }
}

fn check_package_dir(path: &Path, label: &str, issues: &mut Vec<String>) {
    if !path.is_dir() {
        issues.push(format!("{label} does not exist: {}", path.display()));
    } else if !path.join(PACKAGE_FILE).is_file() {
        issues.push(format!("{label} has no {PACKAGE_FILE}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[target]
path = "app"

[[dependencies]]
path = "../libs/ui"
pack = true

[[dependencies.scripts]]
name = "build"
value = "build"

[[dependencies.scripts]]
id = 7
name = "types"
value = "tsc -p ."
disabled = true

[[dependencies]]
path = "/abs/theme"
mode = "sync"
"#;

    fn script(id: Option<u32>, name: &str) -> ScriptEntry {
        ScriptEntry {
            id,
            name: name.into(),
            value: name.into(),
            disabled: false,
        }
    }

    #[test]
    fn test_manifest_deserializes_from_valid_toml() {
        let manifest = Manifest::from_toml(SAMPLE).unwrap();
        assert_eq!(manifest.target.path, "app");
        assert_eq!(manifest.dependencies.len(), 2);

        let ui = &manifest.dependencies[0];
        assert_eq!(ui.mode, DependencyMode::Build);
        assert!(ui.pack);
        assert_eq!(ui.scripts.len(), 2);
        assert_eq!(ui.scripts[1].id, Some(7));
        assert!(ui.scripts[1].disabled);

        let theme = &manifest.dependencies[1];
        assert_eq!(theme.mode, DependencyMode::Sync);
        assert!(!theme.pack);
        assert!(theme.scripts.is_empty());
    }

    #[test]
    fn test_manifest_missing_target_is_error() {
        assert!(Manifest::from_toml("[[dependencies]]\npath = \"a\"\n").is_err());
    }

    #[test]
    fn test_manifest_rejects_unknown_mode() {
        let content = "[target]\npath = \"a\"\n[[dependencies]]\npath = \"b\"\nmode = \"link\"\n";
        assert!(Manifest::from_toml(content).is_err());
    }

    #[test]
    fn test_template_roundtrip() {
        let manifest = Manifest::template(".");
        let parsed = Manifest::from_toml(&manifest.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_resolve_path_relative_and_absolute() {
        let base = Path::new("/work/app");
        assert_eq!(resolve_path(base, "../ui"), PathBuf::from("/work/app/../ui"));
        assert_eq!(resolve_path(base, "/opt/ui"), PathBuf::from("/opt/ui"));
    }

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("LOCALPACK_TEST_LIBS", "/srv/libs");
        assert_eq!(
            substitute_env_vars("${LOCALPACK_TEST_LIBS}/ui"),
            "/srv/libs/ui"
        );
        assert_eq!(substitute_env_vars("${LOCALPACK_TEST_UNSET_VAR}x"), "x");
        assert_eq!(substitute_env_vars("plain/path"), "plain/path");
        std::env::remove_var("LOCALPACK_TEST_LIBS");
    }

    #[test]
    fn test_assign_script_ids_fills_gaps_after_max() {
        let scripts = assign_script_ids(&[
            script(None, "a"),
            script(Some(4), "b"),
            script(None, "c"),
        ]);
        let ids: Vec<u32> = scripts.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![5, 4, 6]);
    }

    #[test]
    fn test_into_request_loads_packages() {
        let root = TempDir::new().unwrap();
        for (dir, name) in [("app", "app"), ("ui", "@acme/ui")] {
            let path = root.path().join(dir);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(
                path.join(PACKAGE_FILE),
                format!("{{\"name\": \"{name}\", \"version\": \"1.0.0\"}}"),
            )
            .unwrap();
        }
        let manifest = Manifest {
            target: TargetEntry { path: "app".into() },
            dependencies: vec![DependencyEntry {
                path: "ui".into(),
                mode: DependencyMode::Build,
                pack: true,
                scripts: vec![script(None, "build")],
            }],
        };

        let request = manifest.into_request(root.path());
        assert_eq!(request.target.name, "app");
        assert_eq!(request.dependencies[0].node.name, "@acme/ui");
        assert!(request.dependencies[0].pack);
        assert_eq!(request.dependencies[0].node.scripts[0].id, 1);
    }

    #[test]
    fn test_validate_reports_problems() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("app")).unwrap();
        std::fs::write(root.path().join("app").join(PACKAGE_FILE), "{}").unwrap();
        std::fs::create_dir_all(root.path().join("bare")).unwrap();

        let entry = |path: &str| DependencyEntry {
            path: path.into(),
            mode: DependencyMode::Build,
            pack: false,
            scripts: Vec::new(),
        };
        let manifest = Manifest {
            target: TargetEntry { path: "app".into() },
            dependencies: vec![entry("bare"), entry("missing"), entry("app"), entry("bare")],
        };

        let issues = manifest.validate(root.path());
        assert!(issues.iter().any(|i| i.contains("has no package.json")));
        assert!(issues.iter().any(|i| i.contains("does not exist")));
        assert!(issues.iter().any(|i| i.contains("is the target itself")));
        assert!(issues.iter().any(|i| i.contains("more than once")));
    }

    #[test]
    fn test_load_missing_manifest() {
        let root = TempDir::new().unwrap();
        let err = Manifest::load(&root.path().join("localpack.toml")).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
    }

    proptest! {
        #[test]
        fn prop_assigned_ids_are_unique(explicit in proptest::collection::vec(proptest::option::of(0u32..20), 0..10)) {
            // Explicit ids are distinct here; duplicates are the user's problem
            let mut used = HashSet::new();
            let entries: Vec<ScriptEntry> = explicit
                .into_iter()
                .enumerate()
                .map(|(i, id)| script(id.filter(|id| used.insert(*id)), &format!("s{i}")))
                .collect();

            let scripts = assign_script_ids(&entries);
            let ids: HashSet<u32> = scripts.iter().map(|s| s.id).collect();
            prop_assert_eq!(ids.len(), scripts.len());
            prop_assert_eq!(assign_script_ids(&entries), scripts);
        }
    }
}
