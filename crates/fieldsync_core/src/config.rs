//! Outbox directory configuration.

use std::path::{Path, PathBuf};

/// Where and how an on-disk outbox keeps its logs.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the outbox files.
    pub dir: PathBuf,

    /// File name of the pending-record log.
    pub records_file: String,

    /// File name of the manual review log.
    pub review_file: String,

    /// Whether every write is synced to media before returning.
    pub sync_on_write: bool,
}

impl StoreConfig {
    /// Creates a configuration rooted at `dir` with default file names.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            records_file: "records.log".to_string(),
            review_file: "review.log".to_string(),
            sync_on_write: true,
        }
    }

    /// Sets whether to sync on every write.
    #[must_use]
    pub fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Path of the pending-record log.
    #[must_use]
    pub fn records_path(&self) -> PathBuf {
        self.dir.join(&self.records_file)
    }

    /// Path of the manual review log.
    #[must_use]
    pub fn review_path(&self) -> PathBuf {
        self.dir.join(&self.review_file)
    }

    /// The outbox directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let config = StoreConfig::new("/data/outbox");
        assert!(config.sync_on_write);
        assert_eq!(
            config.records_path(),
            PathBuf::from("/data/outbox/records.log")
        );
        assert_eq!(config.review_path(), PathBuf::from("/data/outbox/review.log"));
    }

    #[test]
    fn builder() {
        let config = StoreConfig::new("x").sync_on_write(false);
        assert!(!config.sync_on_write);
        assert_eq!(config.dir(), Path::new("x"));
    }
}
