//! Output line classification
//!
//! Each line a process writes is sanitized, stripped of any `<<PID:n>>`
//! marker, and classified as stdout, stderr or fatal stderr.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::config::defaults::FATAL_PATTERNS;

/// Stream a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// A sanitized, classified output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    /// Origin stream
    pub stream: OutputStream,
    /// Visible text (marker removed)
    pub text: String,
    /// Whether the line aborts the task
    pub fatal: bool,
}

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07").expect("valid ANSI regex")
    })
}

fn pid_regex() -> &'static Regex {
    static PID: OnceLock<Regex> = OnceLock::new();
    PID.get_or_init(|| Regex::new(r"<<PID:\s*(\d+)\s*>>").expect("valid PID marker regex"))
}

/// Printable ASCII or an accented Latin-1 letter
pub fn is_kept_char(c: char) -> bool {
    match c {
        ' '..='~' => true,
        '\u{00D7}' | '\u{00F7}' => false,
        '\u{00C0}'..='\u{00FF}' => true,
        _ => false,
    }
}

/// Strip escape sequences and anything outside printable ASCII and accented Latin letters
pub fn sanitize_line(raw: &str) -> String {
    ansi_regex()
        .replace_all(raw, "")
        .chars()
        .filter(|c| is_kept_char(*c))
        .collect()
}

/// Remove a `<<PID:n>>` marker, returning the remaining text and the pid
pub fn extract_pid_marker(line: &str) -> (String, Option<u32>) {
    let re = pid_regex();
    let pid = re
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok());
    match pid {
        Some(pid) => (re.replace_all(line, "").into_owned(), Some(pid)),
        None => (line.to_string(), None),
    }
}

/// Check a stderr line against the fatal patterns (case-insensitive)
pub fn is_fatal(line: &str) -> bool {
    let lower = line.to_lowercase();
    FATAL_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Accumulates the observable state of one running process
#[derive(Debug, Default)]
pub struct OutputCollector {
    ignore_stderr_errors: bool,
    stdout: String,
    last_stderr: Option<String>,
    kill_target: Option<u32>,
}

impl OutputCollector {
    /// Create a collector; `ignore_stderr_errors` disables fatal classification
    pub fn new(ignore_stderr_errors: bool) -> Self {
        Self {
            ignore_stderr_errors,
            ..Self::default()
        }
    }

    /// Classify one raw line and fold it into the collected state
    pub fn accept(&mut self, stream: OutputStream, raw: &str) -> ClassifiedLine {
        let (text, pid) = extract_pid_marker(&sanitize_line(raw));
        if let Some(pid) = pid {
            self.kill_target = Some(pid);
        }

        let fatal = stream == OutputStream::Stderr && !self.ignore_stderr_errors && is_fatal(&text);
        match stream {
            OutputStream::Stdout => {
                self.stdout.push_str(&text);
                self.stdout.push('\n');
            }
            OutputStream::Stderr => {
                if !text.trim().is_empty() {
                    self.last_stderr = Some(text.trim().to_string());
                }
            }
        }

        ClassifiedLine {
            stream,
            text,
            fatal,
        }
    }

    /// Leaf process id announced by the script, if any
    pub fn kill_target(&self) -> Option<u32> {
        self.kill_target
    }

    /// Last non-empty stderr line
    pub fn last_stderr(&self) -> Option<&str> {
        self.last_stderr.as_deref()
    }

    /// Concatenated stdout content
    pub fn into_stdout(self) -> String {
        self.stdout
    }
}
