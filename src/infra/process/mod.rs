//! External process execution
//!
//! Runs one command per [`ProcessTask`] through the host shell, streams and
//! classifies its output, and settles exactly one outcome per task:
//!
//! - the concatenated stdout when the process finishes successfully,
//! - [`ExecError::Classified`] as soon as stderr prints a fatal line,
//! - [`ExecError::NonZeroExit`] when it finishes with a failure code,
//! - [`ExecError::Aborted`] when the task's cancellation token fires.
//!
//! Identical tasks (same cwd, command and arguments) submitted while one is
//! still running share that run's outcome instead of spawning again.

pub mod classify;

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::defaults::{EXIT_GRACE_PERIOD, OUTPUT_CHANNEL_CAPACITY, SESSION_MARKER_PREFIX};
use crate::error::ExecError;

pub use classify::{ClassifiedLine, OutputCollector, OutputStream};

/// Outcome of one process run
pub type ExecOutcome = Result<String, ExecError>;

type SharedOutcome = Shared<BoxFuture<'static, ExecOutcome>>;

/// One external command invocation
#[derive(Debug, Clone)]
pub struct ProcessTask {
    /// Program or shell snippet to run
    pub command: String,
    /// Positional arguments, quoted for the shell
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Do not treat fatal-looking stderr lines as failures
    pub ignore_stderr_errors: bool,
    /// Cancellation for this invocation
    pub cancel: CancellationToken,
}

impl ProcessTask {
    /// Create a task running `command` in `cwd`
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            ignore_stderr_errors: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Keep fatal-looking stderr lines as ordinary output
    #[must_use]
    pub fn ignore_stderr_errors(mut self) -> Self {
        self.ignore_stderr_errors = true;
        self
    }

    /// Attach a cancellation token
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Full shell command line (command followed by quoted arguments)
    pub fn command_line(&self) -> String {
        let mut line = self.command.trim().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote_arg(arg));
        }
        line
    }

    fn key(&self) -> TaskKey {
        TaskKey {
            cwd: self.cwd.clone(),
            command: self.command.trim().to_string(),
            args: self.args.join(" "),
        }
    }
}

/// Invocation signature used for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TaskKey {
    cwd: PathBuf,
    command: String,
    args: String,
}

/// A classified line broadcast to live subscribers
#[derive(Debug, Clone)]
pub struct OutputEvent {
    /// Command line that produced the line
    pub command: String,
    /// The classified line
    pub line: ClassifiedLine,
}

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wait after an exit notification for trailing output
    pub exit_grace: Duration,
    /// Marker carried by every spawned shell, used by teardown
    pub session_marker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exit_grace: EXIT_GRACE_PERIOD,
            session_marker: format!("{SESSION_MARKER_PREFIX}-{}", std::process::id()),
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    in_flight: Mutex<HashMap<TaskKey, (u64, SharedOutcome)>>,
    next_run: AtomicU64,
    spawned: AtomicU64,
    events: broadcast::Sender<OutputEvent>,
}

impl EngineInner {
    fn forget(&self, key: &TaskKey, run: u64) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(key).is_some_and(|(id, _)| *id == run) {
            in_flight.remove(key);
        }
    }
}

/// Process execution engine
///
/// Cheap to clone; clones share the in-flight table and output channel.
/// Create one per application session.
#[derive(Clone)]
pub struct ProcessEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for ProcessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEngine")
            .field("config", &self.inner.config)
            .field("in_flight", &self.in_flight_count())
            .field("spawned", &self.spawn_count())
            .finish()
    }
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEngine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with custom settings
    pub fn with_config(config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                config,
                in_flight: Mutex::new(HashMap::new()),
                next_run: AtomicU64::new(0),
                spawned: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Marker carried by every shell this engine spawns
    pub fn session_marker(&self) -> &str {
        &self.inner.config.session_marker
    }

    /// Subscribe to classified output of every task run from now on
    pub fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.inner.events.subscribe()
    }

    /// Number of processes spawned so far
    pub fn spawn_count(&self) -> u64 {
        self.inner.spawned.load(Ordering::SeqCst)
    }

    /// Number of distinct invocations currently running
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run a task, or join an identical one that is already running
    pub async fn execute(&self, task: ProcessTask) -> ExecOutcome {
        let key = task.key();
        let outcome = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some((_, existing)) = in_flight.get(&key) {
                debug!(
                    command = %key.command,
                    cwd = %key.cwd.display(),
                    "joining in-flight invocation"
                );
                existing.clone()
            } else {
                let run = self.inner.next_run.fetch_add(1, Ordering::Relaxed);
                let inner = Arc::clone(&self.inner);
                let cleanup_key = key.clone();
                let command = task.command_line();
                let handle = tokio::spawn(async move {
                    let result = run_task(&inner, task).await;
                    inner.forget(&cleanup_key, run);
                    result
                });
                let shared = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(ExecError::Spawn {
                            command,
                            error: format!("execution task failed: {e}"),
                        })
                    })
                }
                .boxed()
                .shared();
                in_flight.insert(key, (run, shared.clone()));
                shared
            }
        };

        outcome.await
    }
}

type StreamLine = (OutputStream, String);

async fn run_task(inner: &EngineInner, task: ProcessTask) -> ExecOutcome {
    let command_line = task.command_line();
    if task.cancel.is_cancelled() {
        return Err(ExecError::Aborted {
            command: command_line,
        });
    }

    let mut child = shell_command(&command_line, &inner.config.session_marker)
        .current_dir(&task.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecError::Spawn {
            command: command_line.clone(),
            error: e.to_string(),
        })?;
    inner.spawned.fetch_add(1, Ordering::SeqCst);
    debug!(
        pid = child.id(),
        command = %command_line,
        cwd = %task.cwd.display(),
        "spawned process"
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<StreamLine>();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, OutputStream::Stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, OutputStream::Stderr, tx.clone());
    }
    drop(tx);

    let mut collector = OutputCollector::new(task.ignore_stderr_errors);
    let mut exit: Option<ExitStatus> = None;
    let mut streams_open = true;
    let grace = sleep_until(Instant::now() + Duration::from_secs(86_400));
    tokio::pin!(grace);
    let mut grace_armed = false;

    loop {
        tokio::select! {
            biased;

            () = task.cancel.cancelled() => {
                debug!(command = %command_line, "cancellation requested");
                terminate(&mut child, collector.kill_target()).await;
                return Err(ExecError::Aborted { command: command_line });
            }

            received = rx.recv(), if streams_open => match received {
                Some((stream, raw)) => {
                    let line = collector.accept(stream, &raw);
                    log_line(&command_line, &line);
                    let fatal = line.fatal;
                    let text = line.text.trim().to_string();
                    // No subscribers is fine
                    let _ = inner.events.send(OutputEvent {
                        command: command_line.clone(),
                        line,
                    });
                    if fatal {
                        terminate(&mut child, collector.kill_target()).await;
                        return Err(ExecError::Classified { command: command_line, line: text });
                    }
                }
                None => {
                    streams_open = false;
                    if let Some(status) = exit {
                        return settle(command_line, status, collector);
                    }
                }
            },

            status = child.wait(), if exit.is_none() => {
                let status = status.map_err(|e| ExecError::Spawn {
                    command: command_line.clone(),
                    error: format!("failed to wait for process: {e}"),
                })?;
                debug!(command = %command_line, code = status.code(), "process exited");
                if !streams_open {
                    return settle(command_line, status, collector);
                }
                exit = Some(status);
                grace.as_mut().reset(Instant::now() + inner.config.exit_grace);
                grace_armed = true;
            }

            () = &mut grace, if grace_armed => {
                debug!(command = %command_line, "output streams still open after exit grace period");
                if let Some(status) = exit {
                    return settle(command_line, status, collector);
                }
            }
        }
    }
}

fn settle(command: String, status: ExitStatus, collector: OutputCollector) -> ExecOutcome {
    if status.success() {
        Ok(collector.into_stdout())
    } else {
        Err(ExecError::NonZeroExit {
            command,
            code: status.code(),
            stderr: collector.last_stderr().map(String::from),
        })
    }
}

fn log_line(command: &str, line: &ClassifiedLine) {
    match (line.stream, line.fatal) {
        (_, true) => warn!(command, stream = "stderr", "{}", line.text),
        (OutputStream::Stdout, false) => debug!(command, stream = "stdout", "{}", line.text),
        (OutputStream::Stderr, false) => debug!(command, stream = "stderr", "{}", line.text),
    }
}

fn spawn_reader<R>(stream: R, kind: OutputStream, tx: mpsc::UnboundedSender<StreamLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    for part in line.split(['\n', '\r']).filter(|p| !p.is_empty()) {
                        if tx.send((kind, part.to_string())).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });
}

/// Kill the announced leaf process first, then the spawned process (and its group)
async fn terminate(child: &mut Child, kill_target: Option<u32>) {
    if let Some(pid) = kill_target {
        debug!(pid, "killing announced leaf process");
        kill_pid(pid, false).await;
    }
    if let Some(pid) = child.id() {
        kill_pid(pid, true).await;
    }
    if let Err(e) = child.start_kill() {
        debug!("process already gone: {e}");
    }
    let _ = child.wait().await;
}

/// Forcefully kill a process by id (best effort)
pub async fn kill_pid(pid: u32, whole_group: bool) {
    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", &pid.to_string(), "/T", "/F"]);
        cmd
    } else {
        let mut cmd = Command::new("kill");
        let target = if whole_group {
            format!("-{pid}")
        } else {
            pid.to_string()
        };
        cmd.args(["-KILL", "--", &target]);
        cmd
    };
    let result = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        debug!(pid, "kill failed: {e}");
    }
}

/// Build the host shell invocation for a command line
///
/// On POSIX hosts the session marker becomes the shell's `$0`, so teardown
/// can find the shell by its command line.
fn shell_command(command_line: &str, session_marker: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line).arg(session_marker);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Quote an argument for the host shell when it contains special characters
pub fn quote_arg(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@+,%".contains(c));
    if plain {
        return arg.to_string();
    }
    if cfg!(windows) {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
