//! Error types for upload sessions.

use std::path::PathBuf;

use filedrop_file_ops::FileOpsError;
use filedrop_protocol::FrameError;

/// Errors produced by upload sessions.
///
/// On the receiving side every variant ends the session. On the sending
/// side [`FileNotAccessible`](Self::FileNotAccessible) and write failures
/// only skip the current file.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("incomplete transfer of {filename:?}: got {received} of {expected} bytes")]
    IncompleteTransfer {
        filename: String,
        expected: u64,
        received: u64,
    },

    #[error("file not accessible: {}: {reason}", path.display())]
    FileNotAccessible { path: PathBuf, reason: String },

    #[error("directory conflict: {} is not a directory", .0.display())]
    DirectoryConflict(PathBuf),

    #[error("allocation failed for {}: {source}", path.display())]
    AllocationFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<FrameError> for DataChannelError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::MalformedHeader(msg) => Self::MalformedHeader(msg),
            FrameError::Io(e) => Self::Io(e),
            e @ (FrameError::FilenameTooLong { .. } | FrameError::InvalidFilename(_)) => {
                Self::InvalidFilename(e.to_string())
            }
        }
    }
}

impl From<FileOpsError> for DataChannelError {
    fn from(err: FileOpsError) -> Self {
        match err {
            FileOpsError::DirectoryConflict(path) => Self::DirectoryConflict(path),
            FileOpsError::AllocationFailed { path, source } => {
                Self::AllocationFailed { path, source }
            }
            FileOpsError::NotFound(path) => Self::FileNotAccessible {
                path,
                reason: "not found".into(),
            },
            FileOpsError::NotAFile(path) => Self::FileNotAccessible {
                path,
                reason: "not a regular file".into(),
            },
            FileOpsError::Io(e) => Self::Io(e),
        }
    }
}
