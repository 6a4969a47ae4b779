//! Connection dispatcher.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use filedrop_data_channel::{DataChannelError, SessionSummary, UploadReceiver};
use filedrop_protocol::{DEFAULT_PORT, READ_BUFFER_SIZE};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::ServerError;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Root under which per-peer directories are created. Expected to
    /// exist already.
    pub base_dir: PathBuf,
    /// Payload chunk size for receivers.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            base_dir: PathBuf::from("."),
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}

/// The upload server.
///
/// Accepts connections until its cancellation token fires, then waits for
/// every in-flight session before [`run`](Self::run) returns. Sessions are
/// never interrupted.
pub struct UploadServer {
    config: ServerConfig,
    cancel: CancellationToken,
    tracker: TaskTracker,
    local_addr: Mutex<Option<SocketAddr>>,
    running: AtomicBool,
}

impl UploadServer {
    pub fn new(config: ServerConfig, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            config,
            cancel,
            tracker: TaskTracker::new(),
            local_addr: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Stops accepting new connections.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the accept loop until cancellation, then drains sessions.
    pub async fn run(&self) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                // Not running: a later run() may retry.
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => self.spawn_session(stream, peer_addr),
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }

        drop(listener);
        self.tracker.close();
        if !self.tracker.is_empty() {
            tracing::info!(
                sessions = self.tracker.len(),
                "waiting for in-flight sessions"
            );
        }
        self.tracker.wait().await;
        tracing::info!("server stopped");
        Ok(())
    }

    async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(
            base_dir = %self.config.base_dir.display(),
            "upload server listening on {local_addr}"
        );
        Ok(listener)
    }

    fn spawn_session(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let remote_dir = remote_directory(&self.config.base_dir, peer_addr.ip());
        let buffer_size = self.config.read_buffer_size;
        tracing::info!(%peer_addr, "connection accepted");

        self.tracker.spawn(async move {
            match handle_connection(stream, remote_dir, buffer_size).await {
                Ok(summary) => {
                    tracing::info!(
                        %peer_addr,
                        files = summary.files.len(),
                        bytes = summary.total_bytes,
                        "session complete"
                    );
                }
                Err(e) => {
                    tracing::error!(%peer_addr, "session failed: {e}");
                }
            }
        });
    }
}

/// Directory holding one peer's uploads: `base_dir/<ip>`.
fn remote_directory(base_dir: &Path, ip: IpAddr) -> PathBuf {
    base_dir.join(ip.to_canonical().to_string())
}

/// Runs one session. After a clean end the write half is closed and the
/// read half drained until the peer closes; after a failure the socket is
/// dropped as-is.
async fn handle_connection(
    stream: TcpStream,
    remote_dir: PathBuf,
    buffer_size: usize,
) -> Result<SessionSummary, DataChannelError> {
    let (reader, mut writer) = stream.into_split();
    let reader = BufReader::with_capacity(buffer_size.max(1), reader);
    let mut receiver = UploadReceiver::new(reader, remote_dir).with_buffer_size(buffer_size);

    let summary = receiver.run().await?;

    if let Err(e) = writer.shutdown().await {
        tracing::warn!("failed to half-close connection: {e}");
    }
    let mut reader = receiver.into_inner();
    match tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(bytes = n, "discarded data after terminator"),
        Err(e) => tracing::warn!("error draining connection: {e}"),
    }

    Ok(summary)
}
