//! Doctor command logic
//!
//! Checks the tools the pipeline shells out to and the project manifest.

use std::path::Path;

use serde::Serialize;

use crate::config::defaults::MANIFEST_FILE;
use crate::core::manifest::Manifest;

/// Result of a single dependency check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Name of the dependency being checked
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Version if available
    pub version: Option<String>,
    /// Error message if check failed
    pub error: Option<String>,
    /// Suggestion for fixing the issue
    pub suggestion: Option<String>,
    /// Whether this is a required or optional dependency
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(name: &str, version: Option<String>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            version,
            error: None,
            suggestion: None,
            required,
        }
    }

    /// Create a failing check result
    pub fn fail(name: &str, error: &str, suggestion: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            version: None,
            error: Some(error.to_string()),
            suggestion: suggestion.map(String::from),
            required,
        }
    }
}

/// A tool the doctor looks for
#[derive(Debug, Clone, Copy)]
pub struct ToolCheck {
    /// Display name
    pub name: &'static str,
    /// Executable looked up in PATH
    pub command: &'static str,
    /// Whether the pipeline cannot work without it
    pub required: bool,
    /// Oldest version that works, if any
    pub min_version: Option<&'static str>,
    /// Shown when the tool is missing
    pub suggestion: &'static str,
}

/// Tools checked by `localpack doctor`
pub const TOOLS: &[ToolCheck] = &[
    ToolCheck {
        name: "Git",
        min_version: Some("2.22.0"),
        command: "git",
        required: true,
        suggestion: "Install Git from https://git-scm.com/ or use your package manager",
    },
    ToolCheck {
        name: "Node.js",
        min_version: Some("16.0.0"),
        command: "node",
        required: true,
        suggestion: "Install Node.js from https://nodejs.org/",
    },
    ToolCheck {
        name: "npm",
        min_version: Some("7.0.0"),
        command: "npm",
        required: true,
        suggestion: "npm ships with Node.js; reinstall Node.js if it is missing",
    },
    ToolCheck {
        name: "Yarn",
        min_version: None,
        command: "yarn",
        required: false,
        suggestion: "Enable it with 'corepack enable' if your packages use yarn.lock (optional)",
    },
    ToolCheck {
        name: "pnpm",
        min_version: None,
        command: "pnpm",
        required: false,
        suggestion: "Enable it with 'corepack enable' if your packages use pnpm-lock.yaml (optional)",
    },
];

/// Overall doctor report
#[derive(Debug, Default)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Configuration issues found
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a check result
    pub fn add_check(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    /// Add a configuration issue
    pub fn add_config_issue(&mut self, issue: String) {
        self.config_issues.push(issue);
    }

    /// Check if all required checks passed
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    /// Check if all checks passed (including optional)
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    /// Count passed checks
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Count failed checks
    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// `ok`, `warning` when only optional tools or the manifest need attention, or `error`
    pub fn status(&self) -> &'static str {
        if self.all_passed() {
            "ok"
        } else if self.all_required_passed() {
            "warning"
        } else {
            "error"
        }
    }

    /// Get all failed required checks
    pub fn failed_required(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .collect()
    }
}

/// Version reported by `<command> --version`, if the command is in PATH
pub fn command_version(command: &str) -> Option<String> {
    let path = which::which(command).ok()?;
    let output = std::process::Command::new(path).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    extract_version(&combined)
}

/// Extract version string from command output
fn extract_version(output: &str) -> Option<String> {
    let version_regex = regex::Regex::new(r"v?(\d+\.\d+(?:\.\d+)?(?:-\w+)?)").ok()?;
    version_regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse a reported version, padding a missing patch component
fn parse_version(version: &str) -> Option<semver::Version> {
    semver::Version::parse(version).ok().or_else(|| {
        let core = version.split('-').next()?;
        semver::Version::parse(&format!("{core}.0")).ok()
    })
}

/// Whether `version` is at least `minimum`
///
/// Versions that cannot be parsed are accepted.
pub fn meets_minimum(version: &str, minimum: &str) -> bool {
    match (parse_version(version), semver::VersionReq::parse(&format!(">={minimum}"))) {
        (Some(version), Ok(req)) => req.matches(&version),
        _ => true,
    }
}

/// Run one tool check
pub fn check_tool(tool: &ToolCheck) -> CheckResult {
    if which::which(tool.command).is_err() {
        return CheckResult::fail(
            tool.name,
            &format!("'{}' not found in PATH", tool.command),
            Some(tool.suggestion),
            tool.required,
        );
    }

    let version = command_version(tool.command);
    if let (Some(found), Some(minimum)) = (version.as_deref(), tool.min_version) {
        if !meets_minimum(found, minimum) {
            let mut result = CheckResult::fail(
                tool.name,
                &format!("version {found} is older than {minimum}"),
                Some(tool.suggestion),
                tool.required,
            );
            result.version = version;
            return result;
        }
    }
    CheckResult::pass(tool.name, version, tool.required)
}

/// Problems with the project manifest in `project_dir`, if there is one
pub fn check_project_config(project_dir: &Path) -> Vec<String> {
    let manifest_path = project_dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Vec::new();
    }
    match Manifest::load(&manifest_path) {
        Ok(manifest) => manifest.validate(project_dir),
        Err(e) => vec![e.to_string()],
    }
}

/// Run all doctor checks
pub fn run_doctor(project_dir: Option<&Path>) -> DoctorReport {
    let mut report = DoctorReport::new();

    for tool in TOOLS {
        report.add_check(check_tool(tool));
    }

    if let Some(dir) = project_dir {
        for issue in check_project_config(dir) {
            report.add_config_issue(issue);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_result_pass() {
        let result = CheckResult::pass("test", Some("1.0.0".to_string()), true);
        assert!(result.passed);
        assert_eq!(result.version, Some("1.0.0".to_string()));
        assert!(result.required);
    }

    #[test]
    fn test_check_result_fail() {
        let result = CheckResult::fail("test", "error", Some("suggestion"), false);
        assert!(!result.passed);
        assert_eq!(result.error, Some("error".to_string()));
        assert_eq!(result.suggestion, Some("suggestion".to_string()));
        assert!(!result.required);
    }

    #[test]
    fn test_doctor_report_counts() {
        let mut report = DoctorReport::new();
        report.add_check(CheckResult::pass("a", None, true));
        report.add_check(CheckResult::fail("b", "err", None, true));
        report.add_check(CheckResult::fail("c", "err", None, false));

        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.failed_count(), 2);
        assert!(!report.all_passed());
        assert!(!report.all_required_passed());
        assert_eq!(report.failed_required().len(), 1);
        assert_eq!(report.status(), "error");
    }

    #[test]
    fn test_optional_failures_keep_required_passing() {
        let mut report = DoctorReport::new();
        report.add_check(CheckResult::pass("git", None, true));
        report.add_check(CheckResult::fail("pnpm", "missing", None, false));
        assert!(report.all_required_passed());
        assert!(!report.all_passed());
        assert_eq!(report.status(), "warning");

        let mut clean = DoctorReport::new();
        clean.add_check(CheckResult::pass("git", None, true));
        assert_eq!(clean.status(), "ok");
        clean.add_config_issue("dependency 'ui' does not exist".into());
        assert_eq!(clean.status(), "warning");
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("v20.11.1"), Some("20.11.1".to_string()));
        assert_eq!(extract_version("git version 2.39.0"), Some("2.39.0".to_string()));
        assert_eq!(extract_version("10.2.4"), Some("10.2.4".to_string()));
        assert_eq!(extract_version("no digits"), None);
    }

    #[test]
    fn test_meets_minimum() {
        assert!(meets_minimum("20.11.1", "16.0.0"));
        assert!(meets_minimum("2.39", "2.22.0"));
        assert!(!meets_minimum("14.21.3", "16.0.0"));
        assert!(!meets_minimum("2.17", "2.22.0"));
        assert!(meets_minimum("garbage", "16.0.0"));
    }

    #[test]
    fn test_tool_table_required_set() {
        let required: Vec<&str> = TOOLS.iter().filter(|t| t.required).map(|t| t.command).collect();
        assert_eq!(required, vec!["git", "node", "npm"]);
    }

    #[test]
    fn test_missing_tool_fails() {
        let tool = ToolCheck {
            name: "Nope",
            command: "localpack-definitely-missing-tool",
            required: false,
            min_version: None,
            suggestion: "none",
        };
        let result = check_tool(&tool);
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("not found in PATH"));
    }

    #[test]
    fn test_project_config_without_manifest_is_clean() {
        let dir = TempDir::new().unwrap();
        assert!(check_project_config(dir.path()).is_empty());
    }

    #[test]
    fn test_project_config_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "not [valid").unwrap();
        let issues = check_project_config(dir.path());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("Failed to parse manifest"));
    }
}
