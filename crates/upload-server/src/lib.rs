//! Upload server for filedrop.
//!
//! Listens on a TCP port and runs one [`UploadReceiver`] per accepted
//! connection, storing each peer's files under `base_dir/<peer ip>/`.
//!
//! [`UploadReceiver`]: filedrop_data_channel::UploadReceiver

mod server;

pub use server::{ServerConfig, UploadServer};

/// Errors produced by the upload server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server already running")]
    AlreadyRunning,
}
