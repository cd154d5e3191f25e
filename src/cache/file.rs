//! File-backed cache for persisting API responses to disk
//!
//! Stores each payload as its own file in a cache directory so that repeated
//! CLI invocations can reuse earlier responses. Entries live in a
//! `responses/` subdirectory owned by the cache; clearing removes only that
//! subdirectory, so the cache directory may be shared with other files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use tokio::fs;

use super::{Cache, CacheError};

/// Subdirectory of the cache directory holding the entry files
const ENTRIES_DIR: &str = "responses";

/// Cache that writes one file per key
///
/// The default location is an XDG-compliant cache directory
/// (`~/.cache/headless-cms/` on Linux). Keys are encoded into file names that
/// are safe on every platform, so keys containing `:` or `/` round-trip.
#[derive(Debug, Clone)]
pub struct FileCache {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl FileCache {
    /// Creates a new FileCache using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "headless-cms")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { cache_dir })
    }

    /// Creates a new FileCache with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Directory where cache files are stored
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entries_dir(&self) -> PathBuf {
        self.cache_dir.join(ENTRIES_DIR)
    }

    /// Returns the path to a cache file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        self.entries_dir().join(format!("{}.json", urlencoding::encode(key)))
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(self.cache_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(self.entries_dir()).await?;
        fs::write(self.cache_path(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.cache_path(key)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(self.entries_dir()).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
