//! filedrop upload server entry point.

mod app;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use filedrop_file_ops::resolve_or_create_directory;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Exit status for unusable arguments (same as clap's usage errors).
const EXIT_INVALID_ARGUMENT: u8 = 2;

/// Receives files from filedrop clients and stores them under
/// `<directory>/<client address>/`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// TCP port to listen on [default: 8888]
    #[arg(short, long)]
    port: Option<u16>,

    /// Base directory for uploads, created if absent [default: .]
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e:#}");
            return ExitCode::from(EXIT_INVALID_ARGUMENT);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    rt.block_on(async move {
        let base_dir = match resolve_or_create_directory(&config.directory).await {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(
                    directory = %config.directory.display(),
                    "cannot use upload directory: {e}"
                );
                return ExitCode::from(EXIT_INVALID_ARGUMENT);
            }
        };

        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            base_dir = %base_dir.display(),
            port = config.port,
            "starting filedrop server"
        );

        match app::run(config.to_server_config(base_dir)).await {
            Ok(()) => {
                tracing::info!("server shut down cleanly");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("server error: {e:#}");
                ExitCode::FAILURE
            }
        }
    })
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = Config::load(args.config.as_deref())?
        .with_overrides(args.port, args.directory.clone());
    config.validate()?;
    Ok(config)
}
