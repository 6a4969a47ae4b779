//! Wire protocol for filedrop uploads.
//!
//! A session is a plain TCP byte stream carrying one frame per file,
//! followed by a terminator.
//!
//! # Wire format
//!
//! ```text
//! PER FILE (client -> server):
//!   [filename bytes, UTF-8] 0x00
//!   [file size, decimal ASCII] 0x00
//!   [file size bytes: raw file data]
//!
//! TERMINATOR: [0x00, '0', 0x00]
//! ```
//!
//! A frame whose filename is empty ends the session exactly like the
//! terminator does (the terminator *is* such a frame, with size `0`).

mod error;
pub mod frame;

pub use error::FrameError;
pub use frame::{
    DELIMITER, TERMINATOR, UploadFrame, encode_header, encode_terminator, read_header,
    write_header, write_terminator,
};

/// Default TCP port of the upload server.
pub const DEFAULT_PORT: u16 = 8888;

/// Chunk size used when streaming payload bytes.
pub const READ_BUFFER_SIZE: usize = 8192;

/// Longest filename accepted on the wire, in bytes.
///
/// The protocol itself defines no bound; 255 matches `NAME_MAX` on
/// common file systems.
pub const MAX_FILENAME_LEN: usize = 255;

/// Longest decimal size field (`u64::MAX` has 20 digits).
pub const MAX_SIZE_DIGITS: usize = 20;

/// Longest header accepted by [`read_header`]: filename, size and both
/// delimiters.
pub const MAX_HEADER_LEN: usize = MAX_FILENAME_LEN + MAX_SIZE_DIGITS + 2;
