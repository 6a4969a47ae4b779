//! Per-file header and terminator encoding.
//!
//! Decoding reads one byte at a time from the reader it is handed, so it
//! never consumes a byte past the second delimiter. Callers that want
//! fewer syscalls wrap the socket in a `BufReader` and keep using that
//! same reader for the payload.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;
use crate::{MAX_FILENAME_LEN, MAX_HEADER_LEN};

/// Field delimiter.
pub const DELIMITER: u8 = 0x00;

/// End-of-session marker: `NUL '0' NUL`.
pub const TERMINATOR: [u8; 3] = [DELIMITER, b'0', DELIMITER];

/// A decoded per-file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFrame {
    /// Requested filename. Empty only for the terminator.
    pub filename: String,
    /// Number of payload bytes following the header.
    pub size: u64,
}

impl UploadFrame {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
        }
    }

    /// Returns `true` if this frame ends the session.
    pub fn is_terminator(&self) -> bool {
        self.filename.is_empty()
    }
}

/// Encodes a file header: `filename NUL size NUL`.
///
/// Fails if the filename contains a NUL byte, exceeds
/// [`MAX_FILENAME_LEN`], or is empty while announcing a payload.
pub fn encode_header(filename: &str, size: u64) -> Result<Vec<u8>, FrameError> {
    let name = filename.as_bytes();
    if name.len() > MAX_FILENAME_LEN {
        return Err(FrameError::FilenameTooLong {
            len: name.len(),
            max: MAX_FILENAME_LEN,
        });
    }
    if name.contains(&DELIMITER) {
        return Err(FrameError::InvalidFilename(format!(
            "filename contains a NUL byte: {filename:?}"
        )));
    }
    if name.is_empty() && size != 0 {
        return Err(FrameError::InvalidFilename(
            "empty filename is reserved for the terminator".into(),
        ));
    }

    let size = size.to_string();
    let mut buf = Vec::with_capacity(name.len() + size.len() + 2);
    buf.extend_from_slice(name);
    buf.push(DELIMITER);
    buf.extend_from_slice(size.as_bytes());
    buf.push(DELIMITER);
    Ok(buf)
}

/// Returns the terminator bytes.
pub fn encode_terminator() -> &'static [u8] {
    &TERMINATOR
}

/// Reads one header from the stream.
///
/// Stops right after the second delimiter; the reader is then positioned
/// at the first payload byte. The terminator decodes to a frame with an
/// empty filename and size `0`.
pub async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<UploadFrame, FrameError> {
    let mut filename = Vec::new();
    let mut size_field = Vec::new();
    let mut in_size = false;

    for _ in 0..MAX_HEADER_LEN {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(FrameError::MalformedHeader(
                    "stream ended before header was complete".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        match (byte, in_size) {
            (DELIMITER, false) => in_size = true,
            (DELIMITER, true) => return parse_fields(filename, &size_field),
            (b, false) => filename.push(b),
            (b, true) => size_field.push(b),
        }
    }

    Err(FrameError::MalformedHeader(format!(
        "header exceeds {MAX_HEADER_LEN} bytes"
    )))
}

fn parse_fields(filename: Vec<u8>, size_field: &[u8]) -> Result<UploadFrame, FrameError> {
    if filename.len() > MAX_FILENAME_LEN {
        return Err(FrameError::MalformedHeader(format!(
            "filename is {} bytes (max {MAX_FILENAME_LEN})",
            filename.len()
        )));
    }

    if size_field.is_empty() || !size_field.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::MalformedHeader(format!(
            "invalid file size: {:?}",
            String::from_utf8_lossy(size_field)
        )));
    }

    // All ASCII digits, so the only possible failure is overflow.
    let size = std::str::from_utf8(size_field)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            FrameError::MalformedHeader(format!(
                "file size out of range: {}",
                String::from_utf8_lossy(size_field)
            ))
        })?;

    let filename = String::from_utf8(filename)
        .map_err(|e| FrameError::MalformedHeader(format!("invalid UTF-8 filename: {e}")))?;

    Ok(UploadFrame { filename, size })
}

/// Writes a file header to the stream.
pub async fn write_header<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &UploadFrame,
) -> Result<(), FrameError> {
    let bytes = encode_header(&frame.filename, frame.size)?;
    writer.write_all(&bytes).await?;
    Ok(())
}

/// Writes the terminator to the stream.
pub async fn write_terminator<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), FrameError> {
    writer.write_all(encode_terminator()).await?;
    Ok(())
}
