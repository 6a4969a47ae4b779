//! Per-file transfer progress.

/// Progress of one file, published after every chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    pub filename: String,
    pub transferred: u64,
    pub total: u64,
}

impl TransferProgress {
    /// Completion percentage, `100 * transferred / total`.
    ///
    /// An empty file counts as complete.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.transferred as f64 / self.total as f64
    }

    pub fn is_complete(&self) -> bool {
        self.transferred >= self.total
    }
}
