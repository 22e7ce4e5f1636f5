//! localpack CLI - build local packages and inject them into a consumer
//!
//! Entry point for the localpack command-line application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use localpack::cli::output::{display_error, OutputConfig};
use localpack::cli::Cli;
use localpack::core::global_config::GlobalConfig;
use localpack::infra::dirs::LocalpackDirs;

/// Log filter for a `-v` count, unless `RUST_LOG` is set
fn env_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "warn",
        1 => "warn,localpack=info",
        _ => "warn,localpack=debug",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_tracing(verbose: u8, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A broken global config is reported by the command that needs it
    let config = GlobalConfig::load(&LocalpackDirs::new()).unwrap_or_default();
    let output_config = OutputConfig::new(
        config.quiet(cli.quiet),
        config.json(cli.json),
        cli.verbose,
    );
    output_config.apply_global();
    init_tracing(cli.verbose, output_config.json);

    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
