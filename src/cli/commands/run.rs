//! CLI implementation for `localpack run` command
//!
//! Runs the whole pipeline for the manifest in the current directory. Ctrl-C
//! cancels a running build and tears the session down. When sync-mode
//! dependencies were started, the command keeps running until Ctrl-C, then
//! stops the watchers and restores the original installs.

use std::path::Path;

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::commands::{app_session, load_manifest};
use crate::cli::output::{print_info, verbosity, Notifier};
use crate::core::pipeline::Pipeline;
use crate::core::sync::teardown;
use crate::infra::process::{OutputStream, ProcessEngine};

/// Echo every classified process line to stderr
fn spawn_echo(engine: &ProcessEngine) -> JoinHandle<()> {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let prefix = match event.line.stream {
                        OutputStream::Stdout => "|",
                        OutputStream::Stderr => "!",
                    };
                    eprintln!("  {prefix} {}", event.line.text);
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "output echo lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Cancel `token` on the first Ctrl-C
fn spawn_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            token.cancel();
        }
    })
}

/// Execute the run command
pub async fn execute(path: &Path) -> Result<()> {
    let manifest = load_manifest(path)?;
    let request = manifest.into_request(path);
    let session = app_session()?;

    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt(cancel.clone());
    let echo = (verbosity() > 0).then(|| spawn_echo(session.engine()));

    let mut notifier = Notifier::new(&format!(
        "Delivering {} package(s) to {}",
        request.dependencies.len(),
        request.target.name
    ));
    let report = Pipeline::new(session.clone())
        .with_cancel(cancel.clone())
        .run(&request)
        .await;
    for step in &report.steps {
        notifier.notify(step);
    }

    let aborted = report.was_aborted();
    let failed = report.steps.iter().filter(|s| s.is_error()).count();

    if let Some(handle) = report.teardown {
        let _ = handle.await;
    }

    if let Some(mut sync) = report.sync {
        if !cancel.is_cancelled() {
            notifier.set_message(format!(
                "Syncing {} package(s), press Ctrl-C to stop",
                sync.len()
            ));
            cancel.cancelled().await;
        }

        notifier.set_message("Stopping sync");
        for step in sync.stop().await {
            notifier.notify(&step);
        }
        if let Some(handle) = teardown(&session, None, &request.cwds()) {
            let _ = handle.await;
        }
    }

    notifier.finish();
    interrupt.abort();
    if let Some(echo) = echo {
        echo.abort();
    }

    if aborted {
        anyhow::bail!("Cancelled");
    }
    if failed > 0 {
        anyhow::bail!("{failed} step(s) failed");
    }
    print_info("Done");
    Ok(())
}
