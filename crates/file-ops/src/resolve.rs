//! Path resolution for upload sources and the storage root.

use std::io;
use std::path::{Path, PathBuf};

use crate::FileOpsError;
use crate::store::ensure_directory;

/// Expands a `~` prefix to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.to_str() {
        Some("~") => crate::home_dir(),
        Some(s) => match s.strip_prefix("~/") {
            Some(rest) => crate::home_dir().join(rest),
            None => path.to_path_buf(),
        },
        None => path.to_path_buf(),
    }
}

/// Resolves `path` to the absolute path of an existing regular file.
pub async fn resolve_existing_file(path: &Path) -> Result<PathBuf, FileOpsError> {
    let expanded = expand_home(path);

    let abs = match tokio::fs::canonicalize(&expanded).await {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FileOpsError::NotFound(expanded));
        }
        Err(e) => return Err(e.into()),
    };

    if !tokio::fs::metadata(&abs).await?.is_file() {
        return Err(FileOpsError::NotAFile(abs));
    }

    Ok(abs)
}

/// Resolves `path` to an absolute directory, creating missing segments.
pub async fn resolve_or_create_directory(path: &Path) -> Result<PathBuf, FileOpsError> {
    let expanded = expand_home(path);
    ensure_directory(&expanded).await?;

    let abs = tokio::fs::canonicalize(&expanded).await?;
    tracing::debug!(path = %abs.display(), "resolved directory");
    Ok(abs)
}
