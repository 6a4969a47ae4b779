//! Sending side of an upload session.
//!
//! Streams local files one after another, then the terminator, then
//! half-closes and drains the connection until the server closes it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use filedrop_file_ops::resolve_existing_file;
use filedrop_protocol::{MAX_FILENAME_LEN, UploadFrame, write_header, write_terminator};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::SEND_BUFFER_SIZE;
use crate::error::DataChannelError;
use crate::progress::TransferProgress;

/// A file that was fully transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFile {
    pub path: PathBuf,
    /// Name put on the wire.
    pub name: String,
    pub size: u64,
    pub sent: u64,
}

/// A file that was skipped.
#[derive(Debug)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: DataChannelError,
}

/// Outcome of [`UploadClient::send_all`].
#[derive(Debug, Default)]
pub struct SendReport {
    pub sent: Vec<SentFile>,
    pub failed: Vec<FailedFile>,
}

impl SendReport {
    pub fn total_bytes(&self) -> u64 {
        self.sent.iter().map(|f| f.sent).sum()
    }
}

/// Client side of one upload connection.
pub struct UploadClient<S> {
    stream: BufWriter<S>,
    buf: Vec<u8>,
    progress_tx: Option<mpsc::Sender<TransferProgress>>,
}

impl UploadClient<TcpStream> {
    /// Opens a TCP connection to the server.
    pub async fn connect(addr: SocketAddr) -> Result<Self, DataChannelError> {
        let stream = TcpStream::connect(addr).await?;
        info!(%addr, "connected to server");
        Ok(Self::new(stream))
    }

    /// Connects, sends `paths` and closes the session.
    pub async fn upload(addr: SocketAddr, paths: &[PathBuf]) -> Result<SendReport, DataChannelError> {
        Self::connect(addr).await?.send_all(paths).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> UploadClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufWriter::with_capacity(SEND_BUFFER_SIZE, stream),
            buf: vec![0u8; SEND_BUFFER_SIZE],
            progress_tx: None,
        }
    }

    /// Publishes per-chunk progress on `tx` (non-blocking, lossy).
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Sends one file: header, then exactly its size in bytes.
    ///
    /// Errors raised before the header is written leave the stream framed
    /// and only skip this file. [`DataChannelError::IncompleteTransfer`]
    /// means the header went out but the payload could not be completed.
    pub async fn send_file(&mut self, path: &Path) -> Result<SentFile, DataChannelError> {
        let resolved = resolve_existing_file(path)
            .await
            .map_err(|e| not_accessible(path, e.to_string()))?;
        let name = wire_name(&resolved)?;

        let mut file = File::open(&resolved)
            .await
            .map_err(|e| not_accessible(&resolved, e.to_string()))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| not_accessible(&resolved, e.to_string()))?
            .len();

        info!(file = %name, size, "sending file");
        write_header(&mut self.stream, &UploadFrame::new(name.as_str(), size)).await?;

        let sent = self.copy_contents(&mut file, &name, size).await?;
        self.stream.flush().await?;

        info!(file = %name, size, sent, "file sent");
        Ok(SentFile {
            path: path.to_path_buf(),
            name,
            size,
            sent,
        })
    }

    /// Sends every path in order, then the terminator.
    ///
    /// Files that cannot be sent are reported in [`SendReport::failed`].
    /// An [`IncompleteTransfer`](DataChannelError::IncompleteTransfer)
    /// aborts the batch without a terminator.
    pub async fn send_all(mut self, paths: &[PathBuf]) -> Result<SendReport, DataChannelError> {
        let mut report = SendReport::default();

        for path in paths {
            match self.send_file(path).await {
                Ok(sent) => report.sent.push(sent),
                Err(e @ DataChannelError::IncompleteTransfer { .. }) => {
                    warn!(path = %path.display(), "aborting upload: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!(path = %path.display(), "skipping file: {e}");
                    report.failed.push(FailedFile {
                        path: path.clone(),
                        error: e,
                    });
                }
            }
        }

        write_terminator(&mut self.stream).await?;
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        debug!("terminator sent, draining connection");

        // Wait for the server to close so it never sees a reset.
        match tokio::io::copy(&mut self.stream, &mut tokio::io::sink()).await {
            Ok(n) if n > 0 => debug!(bytes = n, "discarded unexpected server data"),
            Ok(_) => {}
            Err(e) => warn!("error draining connection: {e}"),
        }

        info!(
            sent = report.sent.len(),
            failed = report.failed.len(),
            bytes = report.total_bytes(),
            "upload finished"
        );
        Ok(report)
    }

    async fn copy_contents(
        &mut self,
        file: &mut File,
        name: &str,
        size: u64,
    ) -> Result<u64, DataChannelError> {
        let mut sent: u64 = 0;

        while sent < size {
            let remaining = size - sent;
            let to_read = usize::try_from(remaining).map_or(self.buf.len(), |r| r.min(self.buf.len()));

            let n = match file.read(&mut self.buf[..to_read]).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(file = %name, "local read failed mid-file: {e}");
                    0
                }
            };
            if n == 0 {
                return Err(DataChannelError::IncompleteTransfer {
                    filename: name.to_string(),
                    expected: size,
                    received: sent,
                });
            }

            self.stream.write_all(&self.buf[..n]).await?;
            sent += n as u64;

            if let Some(tx) = &self.progress_tx {
                let _ = tx.try_send(TransferProgress {
                    filename: name.to_string(),
                    transferred: sent,
                    total: size,
                });
            }
        }

        Ok(sent)
    }
}

/// Final component of `path` as it will appear in the header.
fn wire_name(path: &Path) -> Result<String, DataChannelError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| not_accessible(path, "filename is not valid UTF-8".into()))?;

    if name.len() > MAX_FILENAME_LEN {
        return Err(not_accessible(
            path,
            format!("filename is {} bytes (max {MAX_FILENAME_LEN})", name.len()),
        ));
    }
    Ok(name.to_string())
}

fn not_accessible(path: &Path, reason: String) -> DataChannelError {
    DataChannelError::FileNotAccessible {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{SessionState, UploadReceiver};
    use tokio::io::BufReader;
    use tokio::net::TcpListener;

    /// Accepts one connection and runs a receiver on it.
    async fn spawn_receiver(
        dir: PathBuf,
    ) -> (
        SocketAddr,
        tokio::task::JoinHandle<(SessionState, Result<usize, DataChannelError>)>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut receiver = UploadReceiver::new(BufReader::new(reader), dir);
            let result = receiver.run().await.map(|s| s.files.len());
            let _ = writer.shutdown().await;
            (receiver.state(), result)
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn uploads_files_over_tcp() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let a = src.path().join("a.txt");
        let b = src.path().join("b.bin");
        std::fs::write(&a, b"xyz").unwrap();
        std::fs::write(&b, b"").unwrap();

        let (addr, handle) = spawn_receiver(dst.path().to_path_buf()).await;
        let report = UploadClient::upload(addr, &[a, b]).await.unwrap();

        assert_eq!(report.sent.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.total_bytes(), 3);

        let (state, stored) = handle.await.unwrap();
        assert_eq!(state, SessionState::Done);
        assert_eq!(stored.unwrap(), 2);
        assert_eq!(std::fs::read(dst.path().join("a.txt")).unwrap(), b"xyz");
        assert_eq!(std::fs::metadata(dst.path().join("b.bin")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_skipped() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let good = src.path().join("good.txt");
        std::fs::write(&good, b"ok").unwrap();
        let missing = src.path().join("missing.txt");

        let (addr, handle) = spawn_receiver(dst.path().to_path_buf()).await;
        let report = UploadClient::upload(addr, &[missing.clone(), good])
            .await
            .unwrap();

        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, missing);
        assert!(matches!(
            report.failed[0].error,
            DataChannelError::FileNotAccessible { .. }
        ));

        let (state, _) = handle.await.unwrap();
        assert_eq!(state, SessionState::Done);
        assert_eq!(std::fs::read(dst.path().join("good.txt")).unwrap(), b"ok");
        assert!(!dst.path().join("missing.txt").exists());
    }

    #[tokio::test]
    async fn directory_is_skipped() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        let (addr, handle) = spawn_receiver(dst.path().to_path_buf()).await;
        let report = UploadClient::upload(addr, &[src.path().to_path_buf()])
            .await
            .unwrap();

        assert!(report.sent.is_empty());
        assert_eq!(report.failed.len(), 1);
        let (state, stored) = handle.await.unwrap();
        assert_eq!(state, SessionState::Done);
        assert_eq!(stored.unwrap(), 0);
    }

    #[tokio::test]
    async fn same_name_twice_is_versioned_by_server() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let f = src.path().join("dup.txt");
        std::fs::write(&f, b"same").unwrap();

        let (addr, handle) = spawn_receiver(dst.path().to_path_buf()).await;
        UploadClient::upload(addr, &[f.clone(), f]).await.unwrap();
        handle.await.unwrap();

        assert!(dst.path().join("dup.txt").exists());
        assert_eq!(std::fs::read(dst.path().join("dup-v1.txt")).unwrap(), b"same");
    }

    #[tokio::test]
    async fn publishes_progress() {
        let src = tempfile::tempdir().unwrap();
        let f = src.path().join("big.bin");
        let payload = vec![9u8; SEND_BUFFER_SIZE * 2 + 10];
        std::fs::write(&f, &payload).unwrap();

        let (client_side, server_side) = tokio::io::duplex(1024 * 1024);
        let (tx, mut rx) = mpsc::channel(16);
        let mut client = UploadClient::new(client_side).with_progress(tx);

        let sent = client.send_file(&f).await.unwrap();
        assert_eq!(sent.size, payload.len() as u64);
        assert_eq!(sent.sent, sent.size);
        assert_eq!(sent.name, "big.bin");
        drop(server_side);

        let mut last = None;
        while let Ok(evt) = rx.try_recv() {
            last = Some(evt);
        }
        let last = last.unwrap();
        assert!(last.is_complete());
        assert_eq!(last.filename, "big.bin");
    }

    #[tokio::test]
    async fn writes_header_then_payload() {
        let src = tempfile::tempdir().unwrap();
        let f = src.path().join("a.txt");
        std::fs::write(&f, b"xyz").unwrap();

        let (client_side, mut server_side) = tokio::io::duplex(4096);
        let sender = tokio::spawn(async move { UploadClient::new(client_side).send_all(&[f]).await });

        // The client half-closes after the terminator.
        let mut wire = Vec::new();
        server_side.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"a.txt\x003\x00xyz\x000\x00");

        // Closing our side ends the client's drain.
        drop(server_side);
        let report = sender.await.unwrap().unwrap();
        assert_eq!(report.sent.len(), 1);
    }

    #[tokio::test]
    async fn unresolvable_path_is_not_accessible() {
        let src = tempfile::tempdir().unwrap();
        let plain = src.path().join("plain.txt");
        std::fs::write(&plain, b"x").unwrap();

        let (client_side, _server_side) = tokio::io::duplex(1024);
        let mut client = UploadClient::new(client_side);

        // A regular file used as a directory component.
        let result = client.send_file(&plain.join("child")).await;
        assert!(
            matches!(result, Err(DataChannelError::FileNotAccessible { .. })),
            "got {result:?}"
        );
    }

    #[test]
    fn wire_name_rejects_long_names() {
        let long = PathBuf::from("/tmp").join("n".repeat(MAX_FILENAME_LEN + 1));
        assert!(matches!(
            wire_name(&long),
            Err(DataChannelError::FileNotAccessible { .. })
        ));
        assert_eq!(wire_name(Path::new("/x/y/report.txt")).unwrap(), "report.txt");
    }
}
