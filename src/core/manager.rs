//! Package manager detection
//!
//! Each package is built with the manager its lockfile names. Script values
//! written for one manager are rewritten so they run with the detected one.

use std::collections::BTreeMap;
use std::path::Path;

/// Supported package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    /// Yarn (`yarn.lock`)
    Yarn,
    /// pnpm (`pnpm-lock.yaml`)
    Pnpm,
    /// npm (`package-lock.json`, or no lockfile)
    Npm,
}

/// Lockfiles in probing order
const LOCKFILES: &[(&str, PackageManager)] = &[
    ("yarn.lock", PackageManager::Yarn),
    ("pnpm-lock.yaml", PackageManager::Pnpm),
    ("package-lock.json", PackageManager::Npm),
];

/// Prefixes that invoke a package.json script with some manager, longest first
const RUN_PREFIXES: &[&str] = &["npm run ", "yarn run ", "pnpm run "];

/// Bare manager invocations that may name a script directly (`yarn build`)
const BARE_PREFIXES: &[&str] = &["yarn ", "pnpm "];

impl PackageManager {
    /// Probe `cwd` for lockfiles; npm when none is present
    pub fn detect(cwd: &Path) -> Self {
        LOCKFILES
            .iter()
            .find(|(file, _)| cwd.join(file).is_file())
            .map_or(Self::Npm, |(_, manager)| *manager)
    }

    /// Executable name
    pub fn command(&self) -> &'static str {
        match self {
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
            Self::Npm => "npm",
        }
    }

    /// Lockfile that selects this manager
    pub fn lockfile(&self) -> &'static str {
        match self {
            Self::Yarn => "yarn.lock",
            Self::Pnpm => "pnpm-lock.yaml",
            Self::Npm => "package-lock.json",
        }
    }

    /// Prefix that runs a package.json script
    pub fn run_prefix(&self) -> &'static str {
        match self {
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm run",
            Self::Npm => "npm run",
        }
    }

    /// Shell command for one configured script value
    ///
    /// - the name of a declared script runs through this manager,
    /// - `npm run x`, `yarn run x`, `pnpm run x` are rewritten to this manager,
    /// - `yarn x` and `pnpm x` are rewritten when `x` is a declared script,
    /// - anything else runs verbatim.
    pub fn script_command(&self, value: &str, declared: &BTreeMap<String, String>) -> String {
        let value = value.trim();
        if declared.contains_key(value) {
            return format!("{} {value}", self.run_prefix());
        }

        for prefix in RUN_PREFIXES {
            if let Some(rest) = value.strip_prefix(prefix) {
                return format!("{} {}", self.run_prefix(), rest.trim_start());
            }
        }

        for prefix in BARE_PREFIXES {
            if let Some(rest) = value.strip_prefix(prefix) {
                let script = rest.split_whitespace().next().unwrap_or_default();
                if declared.contains_key(script) {
                    return format!("{} {}", self.run_prefix(), rest.trim_start());
                }
            }
        }

        value.to_string()
    }

    /// Command that packs the package in its root directory
    ///
    /// Yarn writes straight to `file_name`; npm and pnpm use their own
    /// naming, which [`packed_file_name`](Self::packed_file_name) predicts.
    pub fn pack_command(&self, file_name: &str) -> String {
        match self {
            Self::Yarn => format!("yarn pack --filename {file_name}"),
            Self::Pnpm => "pnpm pack".to_string(),
            Self::Npm => "npm pack".to_string(),
        }
    }

    /// File the pack command produces for `stem` at `version`
    pub fn packed_file_name(&self, stem: &str, version: &str, file_name: &str) -> String {
        match self {
            Self::Yarn => file_name.to_string(),
            Self::Pnpm | Self::Npm => format!("{stem}-{version}.tgz"),
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command())
    }
}
