//! Image storage - writes captured JPEGs into the image directory
//!
//! Files are named after the local capture time (`YYYYMMDD_HHMMSS.jpg`).
//! Nothing is ever deleted; a second capture within the same second
//! overwrites the first.

use crate::domain::types::image_path;
use anyhow::Context;
use chrono::{DateTime, Local};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the image directory if it does not exist yet
    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create image directory {}", self.dir.display()))?;
        info!(dir = %self.dir.display(), "image_dir_created");
        Ok(())
    }

    /// Write one JPEG captured at `timestamp`; returns the file path
    pub fn write(&self, timestamp: &DateTime<Local>, jpeg: &[u8]) -> std::io::Result<PathBuf> {
        let path = image_path(&self.dir, timestamp);
        fs::write(&path, jpeg)?;
        debug!(path = %path.display(), bytes = %jpeg.len(), "image_written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dir_creates_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = ImageStore::new(&nested);
        store.ensure_dir().unwrap();
        assert!(nested.is_dir());
        // Second call is a no-op
        store.ensure_dir().unwrap();
    }

    #[test]
    fn test_ensure_dir_fails_on_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();
        let store = ImageStore::new(file.join("images"));
        assert!(store.ensure_dir().is_err());
    }

    #[test]
    fn test_write_names_file_by_timestamp() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let ts = Local.with_ymd_and_hms(2024, 5, 17, 10, 0, 2).unwrap();

        let path = store.write(&ts, &[0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        assert_eq!(path, dir.path().join("20240517_100002.jpg"));
        assert_eq!(fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn test_same_second_overwrites() {
        let dir = tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let ts = Local.with_ymd_and_hms(2024, 5, 17, 10, 0, 2).unwrap();

        store.write(&ts, b"first").unwrap();
        let path = store.write(&ts, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
