//! Error types for frame encoding and decoding.

/// Errors produced by the frame codec.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("filename too long: {len} bytes (max {max})")]
    FilenameTooLong { len: usize, max: usize },

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
