//! [`KvStore`] implementations
//!
//! - [`MemoryStore`]: process-local map with an optional byte quota, the
//!   stand-in for browser storage in tests and ephemeral sessions
//! - [`FileStore`]: one file per key in a directory, written atomically so
//!   the store survives restarts

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::traits::KvStore;

/// In-memory string store
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
    /// Maximum of key plus value bytes across all items
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that refuses writes once `quota_bytes` would be exceeded
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes of keys and values currently held
    pub fn used_bytes(&self) -> usize {
        self.items
            .read()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get_item(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut items = self.items.write();

        if let Some(quota) = self.quota_bytes {
            let used: usize = items.iter().map(|(k, v)| k.len() + v.len()).sum();
            let replaced = items.get(key).map_or(0, |old| key.len() + old.len());
            if used - replaced + key.len() + value.len() > quota {
                return Err(CacheError::StorageQuotaExceeded);
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> CacheResult<bool> {
        Ok(self.items.write().remove(key).is_some())
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.items.read().keys().cloned().collect())
    }
}

/// Longest key a [`FileStore`] accepts, keeping hex file names under the
/// common 255 byte limit
pub const MAX_FILE_KEY_LEN: usize = 120;

const FILE_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Distinguishes temp files of concurrent writers within one process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory-backed string store
///
/// Each key maps to `<hex(key)>.json`, so any key survives as a file name and
/// can be recovered by [`keys`](KvStore::keys).
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`
    ///
    /// Temp files orphaned by an interrupted write are removed.
    pub fn new(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(CacheError::Io)?;

        let store = Self { dir };
        let removed = store.remove_stale_temp_files()?;
        if removed > 0 {
            debug!(
                "Removed {} stale temp files from {}",
                removed,
                store.dir.display()
            );
        }
        Ok(store)
    }

    fn remove_stale_temp_files(&self) -> CacheResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir).map_err(CacheError::Io)? {
            let path = entry.map_err(CacheError::Io)?.path();
            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(TEMP_EXTENSION))
            {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }

    /// Unique per write, so two writers of one key never share a temp file
    fn next_temp_path(&self) -> PathBuf {
        let sequence = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("write-{}-{sequence}.{TEMP_EXTENSION}", process::id()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> CacheResult<PathBuf> {
        if key.is_empty() || key.len() > MAX_FILE_KEY_LEN {
            return Err(CacheError::InvalidKey(format!(
                "key length {} outside 1..={MAX_FILE_KEY_LEN}",
                key.len()
            )));
        }
        Ok(self
            .dir
            .join(format!("{}.{FILE_EXTENSION}", hex::encode(key))))
    }

    fn write_temp(temp_path: &Path, value: &str) -> CacheResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp_path)
            .map_err(|e| match e.kind() {
                ErrorKind::StorageFull => CacheError::StorageQuotaExceeded,
                _ => CacheError::Io(e),
            })?;

        file.write_all(value.as_bytes()).map_err(|e| match e.kind() {
            ErrorKind::StorageFull => CacheError::StorageQuotaExceeded,
            _ => CacheError::Io(e),
        })?;
        file.sync_all().map_err(CacheError::Io)
    }

    fn key_from_path(path: &Path) -> Option<String> {
        if !path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(FILE_EXTENSION))
        {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

impl KvStore for FileStore {
    fn get_item(&self, key: &str) -> CacheResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> CacheResult<()> {
        let path = self.path_for(key)?;
        let temp_path = self.next_temp_path();

        let written = Self::write_temp(&temp_path, value)
            .and_then(|()| fs::rename(&temp_path, &path).map_err(CacheError::Io));
        if written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        written
    }

    fn remove_item(&self, key: &str) -> CacheResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(CacheError::Io)? {
            let entry = entry.map_err(CacheError::Io)?;
            if let Some(key) = Self::key_from_path(&entry.path()) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
