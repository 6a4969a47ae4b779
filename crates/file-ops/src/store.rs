//! Collision-safe allocation of upload targets.
//!
//! Files are always created with create-exclusive semantics. When the
//! requested name is taken, the directory is scanned for `base-vN.ext`
//! siblings and `base-v(max+1).ext` is created instead.
//!
//! The scan and the second create are not atomic together: two writers
//! racing on the same base name can both pick the same version. The loser
//! gets [`FileOpsError::AllocationFailed`]; no retry is attempted.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{DirBuilder, File, OpenOptions};
use tracing::{debug, info};

use crate::FileOpsError;

/// The on-disk location chosen for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSlot {
    pub directory: PathBuf,
    /// Final filename, including any version suffix.
    pub filename: String,
    /// `Some(n)` when the name was versioned to `base-vN.ext`.
    pub version: Option<u64>,
}

impl StorageSlot {
    /// Full path of the allocated file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

/// A freshly created, writable file and where it lives.
#[derive(Debug)]
pub struct AllocatedSlot {
    pub slot: StorageSlot,
    pub file: File,
}

/// Ensures `dir` exists as a directory, creating it (and parents) if absent.
pub async fn ensure_directory(dir: &Path) -> Result<(), FileOpsError> {
    if let Ok(meta) = tokio::fs::metadata(dir).await {
        return if meta.is_dir() {
            Ok(())
        } else {
            Err(FileOpsError::DirectoryConflict(dir.to_path_buf()))
        };
    }

    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(crate::DIR_MODE);

    match builder.create(dir).await {
        Ok(()) => {
            debug!(path = %dir.display(), "created directory");
            Ok(())
        }
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::AlreadyExists | io::ErrorKind::NotADirectory
            ) =>
        {
            Err(FileOpsError::DirectoryConflict(dir.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Splits a filename at its first `.` into `(base, extension)`.
///
/// The extension keeps its leading dot and is empty when there is none:
/// `"archive.tar.gz"` gives `("archive", ".tar.gz")`, `"data"` gives
/// `("data", "")`.
pub fn split_filename(filename: &str) -> (&str, &str) {
    match filename.find('.') {
        Some(i) => filename.split_at(i),
        None => (filename, ""),
    }
}

fn versioned_name(base: &str, extension: &str, version: u64) -> String {
    format!("{base}-v{version}{extension}")
}

/// Extracts `N` from an entry named exactly `base-vN<extension>`.
fn parse_version(entry: &str, base: &str, extension: &str) -> Option<u64> {
    let digits = entry
        .strip_prefix(base)?
        .strip_prefix("-v")?
        .strip_suffix(extension)?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Highest existing version of `base-vN<extension>` in `dir`, or 0.
async fn highest_version(dir: &Path, base: &str, extension: &str) -> io::Result<u64> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut max = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(n) = parse_version(name, base, extension) {
            max = max.max(n);
        }
    }

    Ok(max)
}

async fn create_exclusive(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create_new(true);
    #[cfg(unix)]
    options.mode(crate::FILE_MODE);
    options.open(path).await
}

/// Allocates a non-colliding file for `filename` inside `directory`.
///
/// Creates `directory` if needed. Returns the exact name when it is free,
/// otherwise the next `-vN` variant.
pub async fn allocate(directory: &Path, filename: &str) -> Result<AllocatedSlot, FileOpsError> {
    ensure_directory(directory).await.map_err(|e| match e {
        FileOpsError::Io(source) => FileOpsError::AllocationFailed {
            path: directory.to_path_buf(),
            source,
        },
        other => other,
    })?;

    let path = directory.join(filename);
    match create_exclusive(&path).await {
        Ok(file) => {
            return Ok(AllocatedSlot {
                slot: StorageSlot {
                    directory: directory.to_path_buf(),
                    filename: filename.to_string(),
                    version: None,
                },
                file,
            });
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(source) => return Err(FileOpsError::AllocationFailed { path, source }),
    }

    let (base, extension) = split_filename(filename);
    let max = highest_version(directory, base, extension)
        .await
        .map_err(|source| FileOpsError::AllocationFailed {
            path: path.clone(),
            source,
        })?;

    let version = max
        .checked_add(1)
        .ok_or_else(|| FileOpsError::AllocationFailed {
            path: path.clone(),
            source: io::Error::other("version counter exhausted"),
        })?;

    let versioned = versioned_name(base, extension, version);
    let path = directory.join(&versioned);
    info!(requested = filename, path = %path.display(), "using versioned filename");

    let file = create_exclusive(&path)
        .await
        .map_err(|source| FileOpsError::AllocationFailed { path, source })?;

    Ok(AllocatedSlot {
        slot: StorageSlot {
            directory: directory.to_path_buf(),
            filename: versioned,
            version: Some(version),
        },
        file,
    })
}
