//! Upload sessions over a plain TCP stream.
//!
//! [`UploadClient`] streams local files to a server; [`UploadReceiver`]
//! runs the server side of one connection, storing each file through the
//! versioned store of `filedrop-file-ops`.
//!
//! # Wire format
//!
//! See [`filedrop_protocol`] for the frame layout.

pub mod client;
pub mod error;
pub mod progress;
pub mod server;

pub use client::{FailedFile, SendReport, SentFile, UploadClient};
pub use error::DataChannelError;
pub use progress::TransferProgress;
pub use server::{
    FilenameCheck, SessionState, SessionSummary, StoredFile, UploadReceiver, validate_filename,
};

pub use filedrop_protocol::READ_BUFFER_SIZE;

/// Write buffer and file read chunk size on the sending side (64 KB).
pub const SEND_BUFFER_SIZE: usize = 64 * 1024;
