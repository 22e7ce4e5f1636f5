//! Output formatting and progress indicators
//!
//! Global output mode (quiet, JSON, verbosity), status-prefixed messages,
//! spinners, and the rendering of pipeline step results as notifications.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::core::step::{Severity, StepResult};

static QUIET: AtomicBool = AtomicBool::new(false);
static JSON: AtomicBool = AtomicBool::new(false);
static VERBOSITY: AtomicU8 = AtomicU8::new(0);

/// Output mode selected on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Only errors are printed
    pub quiet: bool,
    /// Machine-readable output
    pub json: bool,
    /// `-v` count
    pub verbose: u8,
}

impl OutputConfig {
    /// Create an output configuration
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this configuration visible to every output helper
    pub fn apply_global(&self) {
        QUIET.store(self.quiet, Ordering::Relaxed);
        JSON.store(self.json, Ordering::Relaxed);
        VERBOSITY.store(self.verbose, Ordering::Relaxed);
    }
}

/// Whether quiet mode is active
pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Whether JSON mode is active
pub fn is_json() -> bool {
    JSON.load(Ordering::Relaxed)
}

/// Current `-v` count
pub fn verbosity() -> u8 {
    VERBOSITY.load(Ordering::Relaxed)
}

fn is_silent() -> bool {
    is_quiet() || is_json()
}

/// Print an informational message
pub fn print_info(message: &str) {
    if !is_silent() {
        println!("{} {message}", status::INFO);
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    if !is_silent() {
        println!("{} {message}", status::SUCCESS);
    }
}

/// Print a warning to stderr
pub fn print_warning(message: &str) {
    if !is_json() {
        eprintln!("{} {message}", status::WARNING);
    }
}

/// Print an indented detail line
pub fn print_detail(message: &str) {
    if !is_silent() {
        println!("  {message}");
    }
}

/// Print a JSON document to stdout
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("{} Failed to serialize output: {e}", status::ERROR),
    }
}

/// Report a command failure
pub fn display_error(error: &anyhow::Error) {
    if is_json() {
        let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        print_json(&serde_json::json!({
            "status": "error",
            "error": error.to_string(),
            "causes": causes,
        }));
        return;
    }

    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}

/// Create a spinner for operations with unknown duration
///
/// Hidden in quiet and JSON modes.
pub fn create_spinner(message: &str) -> ProgressBar {
    if is_silent() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// A step result as a notification
#[derive(Debug, Clone, Serialize)]
pub struct Notification<'a> {
    /// Notification severity
    pub severity: Severity,
    /// Errors stay until dismissed
    pub sticky: bool,
    /// The step itself
    #[serde(flatten)]
    pub step: &'a StepResult,
}

impl<'a> From<&'a StepResult> for Notification<'a> {
    fn from(step: &'a StepResult) -> Self {
        Self {
            severity: step.severity(),
            sticky: step.is_sticky(),
            step,
        }
    }
}

/// Render a step result as one line of text
pub fn format_step(step: &StepResult) -> String {
    match (&step.error, &step.content) {
        (Some(error), _) if step.is_aborted() => {
            format!("{} {}: {}", status::WARNING, step.title, error.message)
        }
        (Some(error), _) => format!(
            "{} {}: {} [{}]",
            status::ERROR,
            step.title,
            error.message,
            error.kind.as_str()
        ),
        (None, Some(content)) => format!("{} {}: {content}", status::SUCCESS, step.title),
        (None, None) => format!("{} {}", status::SUCCESS, step.title),
    }
}

/// Shows step results while a spinner is running
///
/// Sticky notifications are repeated by [`Notifier::finish`] so errors are
/// still on screen after the run.
#[derive(Debug)]
pub struct Notifier {
    spinner: ProgressBar,
    sticky: Vec<String>,
}

impl Notifier {
    /// Start a notifier with a spinner message
    pub fn new(message: &str) -> Self {
        Self {
            spinner: create_spinner(message),
            sticky: Vec::new(),
        }
    }

    /// Update the spinner message
    pub fn set_message(&self, message: impl Into<String>) {
        self.spinner.set_message(message.into());
    }

    /// Show one step result
    pub fn notify(&mut self, step: &StepResult) {
        if is_json() {
            // One object per line so consumers can stream them
            if let Ok(line) = serde_json::to_string(&Notification::from(step)) {
                println!("{line}");
            }
            return;
        }
        let line = format_step(step);
        if step.is_sticky() {
            self.sticky.push(line.clone());
            self.spinner.suspend(|| eprintln!("{line}"));
        } else if !is_quiet() {
            self.spinner.suspend(|| println!("{line}"));
        }
    }

    /// Stop the spinner and repeat the sticky notifications
    pub fn finish(self) {
        self.spinner.finish_and_clear();
        if self.sticky.len() > 1 && !is_json() {
            eprintln!();
            eprintln!("{} {} step(s) failed:", status::ERROR, self.sticky.len());
            for line in &self.sticky {
                eprintln!("  {line}");
            }
        }
    }
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_format_success_step() {
        let step = StepResult::success("@acme/ui", "injected into app");
        assert_eq!(format_step(&step), "✓ @acme/ui: injected into app");
    }

    #[test]
    fn test_format_error_step_names_kind() {
        let step = StepResult::failure("b", ErrorKind::NonZeroExit, "exit code 2");
        assert_eq!(format_step(&step), "✗ b: exit code 2 [non_zero_exit]");
    }

    #[test]
    fn test_format_aborted_step_is_a_warning() {
        let step = StepResult::aborted("c");
        assert!(format_step(&step).starts_with(status::WARNING));
    }

    #[test]
    fn test_notification_marks_errors_sticky() {
        let ok = StepResult::success("a", "done");
        let failed = StepResult::failure("b", ErrorKind::ArtifactNotFound, "missing");

        let ok = serde_json::to_value(Notification::from(&ok)).unwrap();
        assert_eq!(ok["severity"], "success");
        assert_eq!(ok["sticky"], false);
        assert_eq!(ok["title"], "a");

        let failed = serde_json::to_value(Notification::from(&failed)).unwrap();
        assert_eq!(failed["severity"], "error");
        assert_eq!(failed["sticky"], true);
        assert_eq!(failed["error"]["message"], "missing");
    }
}
