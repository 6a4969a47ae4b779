//! filedrop upload client entry point.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use filedrop_data_channel::UploadClient;
use filedrop_protocol::DEFAULT_PORT;
use tracing_subscriber::EnvFilter;

/// Sends files to a filedrop server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server IPv4 address (dotted decimal)
    #[arg(short = 's', long)]
    server: Ipv4Addr,

    /// Server TCP port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Files to upload, sent in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("upload failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let addr = SocketAddr::from((args.server, args.port));
    let rt = tokio::runtime::Runtime::new()?;

    let report = rt.block_on(UploadClient::upload(addr, &args.files))?;

    for failed in &report.failed {
        tracing::error!(path = %failed.path.display(), "not sent: {}", failed.error);
    }
    tracing::info!(
        sent = report.sent.len(),
        skipped = report.failed.len(),
        bytes = report.total_bytes(),
        "done"
    );
    Ok(())
}
