//! File operations for the upload server and client.
//!
//! Resolves user-supplied paths and allocates non-colliding files inside
//! per-remote upload directories.

mod resolve;
mod store;

use std::path::PathBuf;

pub use resolve::{expand_home, resolve_existing_file, resolve_or_create_directory};
pub use store::{AllocatedSlot, StorageSlot, allocate, ensure_directory, split_filename};

/// Permission bits for created directories (before umask).
pub const DIR_MODE: u32 = 0o777;

/// Permission bits for created files (before umask).
pub const FILE_MODE: u32 = 0o666;

/// Errors produced by the file-ops crate.
#[derive(Debug, thiserror::Error)]
pub enum FileOpsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("path exists and is not a directory: {}", .0.display())]
    DirectoryConflict(PathBuf),

    #[error("failed to allocate {}: {source}", path.display())]
    AllocationFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Returns the user's home directory.
fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
