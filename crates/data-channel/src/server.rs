//! Receiving side of an upload session.
//!
//! One [`UploadReceiver`] per connection. It decodes a header, stores the
//! announced number of payload bytes through the versioned store, and
//! repeats until the peer sends the terminator. Any error is fatal to the
//! session.

use std::mem;
use std::path::PathBuf;

use filedrop_file_ops::{AllocatedSlot, StorageSlot, allocate};
use filedrop_protocol::{READ_BUFFER_SIZE, UploadFrame, read_header};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::DataChannelError;
use crate::progress::TransferProgress;

/// Receiver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFrame,
    ReceivingPayload,
    Done,
    Failed,
}

impl SessionState {
    /// `Done` and `Failed` accept no further frames.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Result of checking a requested filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameCheck {
    /// Empty name: the peer is done sending.
    EndOfTransmission,
    /// Name may be stored as-is.
    Accepted,
}

/// Checks a requested filename.
///
/// Only path separators are rejected. Everything else, leading dots
/// included, is accepted as-is.
pub fn validate_filename(filename: &str) -> Result<FilenameCheck, DataChannelError> {
    if filename.is_empty() {
        return Ok(FilenameCheck::EndOfTransmission);
    }
    if filename.contains(['/', '\\']) {
        return Err(DataChannelError::InvalidFilename(format!(
            "path separator not allowed: {filename:?}"
        )));
    }
    Ok(FilenameCheck::Accepted)
}

/// A file stored during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Name the peer asked for.
    pub requested: String,
    pub slot: StorageSlot,
    pub size: u64,
}

/// Outcome of a session that reached `Done`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub files: Vec<StoredFile>,
    pub total_bytes: u64,
}

/// Server side of one upload connection.
pub struct UploadReceiver<R> {
    reader: R,
    directory: PathBuf,
    state: SessionState,
    buf: Vec<u8>,
    files: Vec<StoredFile>,
    progress_tx: Option<mpsc::Sender<TransferProgress>>,
}

impl<R: AsyncRead + Unpin> UploadReceiver<R> {
    /// Creates a receiver storing files under `directory`.
    ///
    /// `reader` must be the only reader of the connection for the whole
    /// session; wrap sockets in a `BufReader` here, not around the header
    /// decoder alone.
    pub fn new(reader: R, directory: PathBuf) -> Self {
        Self {
            reader,
            directory,
            state: SessionState::AwaitingFrame,
            buf: vec![0u8; READ_BUFFER_SIZE],
            files: Vec::new(),
            progress_tx: None,
        }
    }

    /// Sets the payload chunk size. Zero is treated as one byte.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buf = vec![0u8; size.max(1)];
        self
    }

    /// Publishes per-chunk progress on `tx` (non-blocking, lossy).
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the underlying reader, e.g. to drain it after `Done`.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Processes exactly one frame.
    ///
    /// Returns the new state. On error the state is `Failed`. Once the
    /// session is finished this is a no-op returning the final state.
    pub async fn step(&mut self) -> Result<SessionState, DataChannelError> {
        if self.state.is_finished() {
            return Ok(self.state);
        }

        match self.receive_frame().await {
            Ok(state) => {
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Processes frames until the terminator or the first error.
    pub async fn run(&mut self) -> Result<SessionSummary, DataChannelError> {
        while self.step().await? != SessionState::Done {}

        let files = mem::take(&mut self.files);
        let total_bytes = files.iter().map(|f| f.size).sum();
        Ok(SessionSummary { files, total_bytes })
    }

    async fn receive_frame(&mut self) -> Result<SessionState, DataChannelError> {
        self.state = SessionState::AwaitingFrame;
        let frame = read_header(&mut self.reader).await?;

        if validate_filename(&frame.filename)? == FilenameCheck::EndOfTransmission {
            if frame.size != 0 {
                warn!(
                    size = frame.size,
                    "empty filename announced a payload; treating as end of transmission"
                );
            }
            debug!("end of transmission received");
            return Ok(SessionState::Done);
        }

        info!(filename = %frame.filename, size = frame.size, "processing file");

        let AllocatedSlot { slot, mut file } = allocate(&self.directory, &frame.filename).await?;
        self.state = SessionState::ReceivingPayload;

        // Flush whatever arrived even when the payload is cut short.
        let copied = self.copy_payload(&mut file, &frame).await;
        let flushed = file.flush().await;
        copied?;
        flushed?;

        info!(path = %slot.path().display(), size = frame.size, "file stored");
        self.files.push(StoredFile {
            requested: frame.filename,
            slot,
            size: frame.size,
        });

        Ok(SessionState::AwaitingFrame)
    }

    async fn copy_payload(
        &mut self,
        file: &mut File,
        frame: &UploadFrame,
    ) -> Result<(), DataChannelError> {
        let mut received: u64 = 0;

        while received < frame.size {
            let remaining = frame.size - received;
            let to_read = usize::try_from(remaining).map_or(self.buf.len(), |r| r.min(self.buf.len()));

            let n = match self.reader.read(&mut self.buf[..to_read]).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(filename = %frame.filename, "connection error mid-payload: {e}");
                    0
                }
            };
            if n == 0 {
                return Err(DataChannelError::IncompleteTransfer {
                    filename: frame.filename.clone(),
                    expected: frame.size,
                    received,
                });
            }

            file.write_all(&self.buf[..n]).await?;
            received += n as u64;

            let progress = TransferProgress {
                filename: frame.filename.clone(),
                transferred: received,
                total: frame.size,
            };
            trace!(
                filename = %frame.filename,
                "receiving file: {:.2}% complete",
                progress.percent()
            );
            if let Some(tx) = &self.progress_tx {
                let _ = tx.try_send(progress);
            }
        }

        Ok(())
    }
}
