//! CLI command for `localpack doctor`
//!
//! Tools first, then the manifest in the current directory.

use std::path::Path;

use anyhow::Result;

use crate::cli::output::{is_json, is_quiet, print_detail, print_json, status};
use crate::core::doctor::{run_doctor, CheckResult, DoctorReport};

/// One line per tool, e.g. `✓ npm 10.2.4` or `✗ Yarn (optional): not found`
fn check_line(check: &CheckResult) -> String {
    let label = if check.required {
        check.name.clone()
    } else {
        format!("{} (optional)", check.name)
    };
    match (check.passed, &check.error, &check.version) {
        (true, _, Some(version)) => format!("{} {label} {version}", status::SUCCESS),
        (true, _, None) => format!("{} {label}", status::SUCCESS),
        (false, Some(error), _) => format!("{} {label}: {error}", status::ERROR),
        (false, None, _) => format!("{} {label}", status::ERROR),
    }
}

fn print_report(report: &DoctorReport) {
    println!("Tools");
    for check in &report.checks {
        println!("  {}", check_line(check));
        if !check.passed {
            if let Some(suggestion) = &check.suggestion {
                print_detail(suggestion);
            }
        }
    }

    println!("Manifest");
    if report.config_issues.is_empty() {
        println!("  {} no issues", status::SUCCESS);
    }
    for issue in &report.config_issues {
        println!("  {} {issue}", status::WARNING);
    }

    println!(
        "{} of {} tools found",
        report.passed_count(),
        report.checks.len()
    );
}

/// Execute the doctor command
pub async fn execute(project_dir: Option<&Path>) -> Result<()> {
    let report = run_doctor(project_dir);

    if is_json() {
        print_json(&serde_json::json!({
            "status": report.status(),
            "tools": report.checks,
            "manifest_issues": report.config_issues,
        }));
    } else if is_quiet() {
        for check in report.failed_required() {
            eprintln!("{}", check_line(check));
        }
    } else {
        print_report(&report);
    }

    if !report.all_required_passed() {
        let missing: Vec<&str> = report
            .failed_required()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        anyhow::bail!("Missing required tools: {}", missing.join(", "));
    }
    Ok(())
}
