//! Common test utilities and helpers
//!
//! Temporary workspaces holding local packages, and helpers to run the
//! compiled binary inside them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use localpack::core::package::{DependencyPackage, NamedScript, PackageNode};
use localpack::core::session::Session;
use localpack::infra::dirs::LocalpackDirs;
use localpack::infra::process::{EngineConfig, ProcessEngine};
use tempfile::TempDir;

/// Path of the compiled binary
pub const BIN: &str = env!("CARGO_BIN_EXE_localpack");

/// Version the pipeline writes while building
pub const MARKER: &str = localpack::config::defaults::MARKER_VERSION;

/// Test workspace
///
/// A temporary directory with one subdirectory per package, plus private
/// config and temporary directories for the binary.
pub struct TestProject {
    /// Temporary directory for the test workspace
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new workspace in a temporary directory
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir_all(dir.path().join(".localpack/config"))
            .expect("Failed to create config directory");
        Self { dir }
    }

    /// Get the path to the workspace
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Temporary directory handed to the binary
    pub fn tmp_dir(&self) -> PathBuf {
        self.dir.path().join(".localpack/tmp")
    }

    /// Create a file in the workspace
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the workspace
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the workspace
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Create `<dir>/package.json` and return the package directory
    pub fn add_package(&self, dir: &str, name: &str, version: &str, deps: &[&str]) -> PathBuf {
        self.create_file(&format!("{dir}/package.json"), &package_json(name, version, deps));
        self.dir.path().join(dir)
    }

    /// Run the binary in the workspace with private config and tmp dirs
    pub fn localpack(&self, args: &[&str]) -> Output {
        Command::new(BIN)
            .current_dir(self.path())
            .env("LOCALPACK_CONFIG_DIR", self.dir.path().join(".localpack/config"))
            .env("LOCALPACK_TMP_DIR", self.tmp_dir())
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("Failed to execute localpack")
    }

    /// Session using the compiled binary as helper and a marker unique to `test`
    pub fn session(&self, test: &str) -> Session {
        let engine = ProcessEngine::with_config(EngineConfig {
            exit_grace: Duration::from_millis(100),
            session_marker: format!("localpack-session-it-{test}-{}", std::process::id()),
        });
        Session::new(engine, LocalpackDirs::new().with_tmp_dir(self.tmp_dir())).with_helper(BIN)
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A package.json with two-space indentation and a trailing newline
pub fn package_json(name: &str, version: &str, deps: &[&str]) -> String {
    let deps: Vec<String> = deps.iter().map(|d| format!("    \"{d}\": \"*\"")).collect();
    let deps = if deps.is_empty() {
        String::from("{}")
    } else {
        format!("{{\n{}\n  }}", deps.join(",\n"))
    };
    format!(
        "{{\n  \"name\": \"{name}\",\n  \"version\": \"{version}\",\n  \"dependencies\": {deps}\n}}\n"
    )
}

/// Shell script that packs the package into `<into>/<stem>-v<marker>.tgz`
///
/// Produces the same layout package managers do: a `package/` root.
pub fn pack_script(stem: &str, into: &str) -> String {
    format!(
        "rm -rf .pack && mkdir -p .pack/package {into} && cp package.json .pack/package/ \
         && tar -czf {into}/{stem}-v{MARKER}.tgz -C .pack package && rm -rf .pack"
    )
}

/// Build-mode dependency with the given scripts
pub fn build_dep(cwd: &Path, scripts: &[&str]) -> DependencyPackage {
    let scripts = scripts
        .iter()
        .enumerate()
        .map(|(i, value)| NamedScript::new(i as u32 + 1, format!("step{}", i + 1), *value))
        .collect();
    DependencyPackage::build(PackageNode::load(cwd).with_scripts(scripts))
}
