//! Durable secondary cache layer.
//!
//! Entries are stored as one JSON file per key in the cache directory. The
//! file name is a stable hash of the key; the key itself is stored inside the
//! file so collisions and pattern invalidation can be checked.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::CacheEntry;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Durable cache unavailable: {0}")]
    Unavailable(String),
}

/// Storage behind the in-memory cache layer.
pub trait DurableStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn save(&self, entry: &CacheEntry) -> Result<(), CacheError>;
    /// Remove every entry whose key contains `pattern`; returns how many were removed
    fn remove_matching(&self, pattern: &str) -> Result<usize, CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{:016x}.json", fnv1a_64(key.as_bytes())))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut files = Vec::new();
        for dir_entry in std::fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn read_entry(path: &Path) -> Result<CacheEntry, CacheError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl DurableStore for DiskStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let entry = Self::read_entry(&path)?;
        if entry.key != key {
            debug!(key, stored = %entry.key, "Durable cache hash collision");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let contents = serde_json::to_string(entry)?;
        std::fs::write(self.entry_path(&entry.key), contents)?;
        Ok(())
    }

    fn remove_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            // Unreadable files are skipped; this is best-effort
            match Self::read_entry(&path) {
                Ok(entry) if entry.key.contains(pattern) => {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
                Ok(_) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable cache file"),
            }
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<(), CacheError> {
        for path in self.entry_files()? {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// 64-bit FNV-1a. Stable across builds, unlike `DefaultHasher`.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Payload;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_fnv_known_values() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_save_load_remove() {
        let dir = tempdir().expect("tempdir");
        let store = DiskStore::new(dir.path().join("responses")).expect("disk store");

        let a = CacheEntry::new("GET /api/budgets/", Payload::Text("a".into()), Duration::from_secs(60));
        let b = CacheEntry::new("GET /api/forecasts/", Payload::Text("b".into()), Duration::from_secs(60));
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        assert_eq!(store.load("GET /api/budgets/").unwrap(), Some(a));
        assert_eq!(store.load("GET /api/missing/").unwrap(), None);

        assert_eq!(store.remove_matching("budgets").unwrap(), 1);
        assert_eq!(store.load("GET /api/budgets/").unwrap(), None);
        assert!(store.load("GET /api/forecasts/").unwrap().is_some());

        store.clear().unwrap();
        assert_eq!(store.load("GET /api/forecasts/").unwrap(), None);
    }
}
