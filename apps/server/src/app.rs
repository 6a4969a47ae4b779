//! Wires the upload server to the process: shutdown on Ctrl-C.

use filedrop_upload_server::{ServerConfig, UploadServer};
use tokio_util::sync::CancellationToken;

/// Runs the server until Ctrl-C, then waits for in-flight uploads.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let server = UploadServer::new(config, cancel.clone());

    let signal = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received Ctrl-C, stopping");
                cancel.cancel();
            }
            Err(e) => tracing::error!("failed to listen for Ctrl-C: {e}"),
        }
    });

    let result = server.run().await;
    signal.abort();
    result?;
    Ok(())
}
