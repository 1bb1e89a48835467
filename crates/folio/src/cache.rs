// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Module caching.
//!
//! - [`ModuleCache`]: in-memory LRU keyed by absolute path, with optional
//!   capacity and time-to-live. Each loader owns its own instances, so tests
//!   can build independent caches.
//! - [`TransformCache`]: persistent transpiler output keyed by
//!   `sha256(path + sha256(content))`. Speeds up cold starts; never changes
//!   what a load returns.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::fs::Metadata;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

use crate::error::{FolioError, Result};
use crate::transpiler::TransformOutput;

/// Staleness check for a source file: modification time plus length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

impl Fingerprint {
    /// Fingerprint from already-fetched metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        }
    }

    /// Reads the current fingerprint of `path`.
    ///
    /// A missing file is reported as [`FolioError::NotFound`].
    pub async fn of(path: &Path) -> Result<Self> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => Ok(Self::from_metadata(&metadata)),
            Ok(_) => Err(FolioError::NotFound(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FolioError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Eviction settings for a [`ModuleCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries; `None` never evicts by size.
    pub capacity: Option<usize>,
    /// Maximum entry age; `None` never expires entries.
    pub ttl: Option<Duration>,
}

struct CacheEntry<V> {
    value: Arc<V>,
    inserted: Instant,
}

/// In-memory LRU cache keyed by absolute file path.
pub struct ModuleCache<V> {
    cache: Arc<Mutex<LruCache<PathBuf, CacheEntry<V>>>>,
    ttl: Option<Duration>,
}

impl<V> Clone for ModuleCache<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            ttl: self.ttl,
        }
    }
}

impl<V> std::fmt::Debug for ModuleCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<V> ModuleCache<V> {
    /// Creates a cache with the given eviction settings.
    pub fn new(config: CacheConfig) -> Self {
        let lru_cache = match config.capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };

        Self {
            cache: Arc::new(Mutex::new(lru_cache)),
            ttl: config.ttl,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<PathBuf, CacheEntry<V>>>> {
        self.cache
            .lock()
            .map_err(|_| FolioError::Cache("Failed to acquire cache lock".to_string()))
    }

    /// Retrieves an entry, dropping it if it outlived the TTL.
    pub fn get(&self, key: &Path) -> Result<Option<Arc<V>>> {
        let mut cache = self.lock()?;
        let expired = match cache.get(key) {
            None => return Ok(None),
            Some(entry) => self.ttl.is_some_and(|ttl| entry.inserted.elapsed() > ttl),
        };
        if expired {
            debug!(path = %key.display(), "cache entry expired");
            cache.pop(key);
            return Ok(None);
        }
        Ok(cache.get(key).map(|entry| Arc::clone(&entry.value)))
    }

    /// Stores an entry, replacing any previous one.
    pub fn insert(&self, key: &Path, value: Arc<V>) -> Result<()> {
        self.lock()?.put(
            key.to_path_buf(),
            CacheEntry {
                value,
                inserted: Instant::now(),
            },
        );
        Ok(())
    }

    /// Removes an entry.
    pub fn remove(&self, key: &Path) -> Result<()> {
        self.lock()?.pop(key);
        Ok(())
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    /// Checks if a key is cached (ignores TTL).
    pub fn contains_key(&self, key: &Path) -> bool {
        self.cache.lock().map(|c| c.contains(key)).unwrap_or(false)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persistent transpiler output cache.
///
/// Entries are JSON files named by their key. Read and write failures are
/// logged and treated as misses.
#[derive(Debug, Clone)]
pub struct TransformCache {
    cache_dir: PathBuf,
}

impl TransformCache {
    /// Creates the cache, creating `cache_dir` if needed.
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            FolioError::Cache(format!("Failed to create cache directory: {}", e))
        })?;
        Ok(Self { cache_dir })
    }

    /// Cache key for a source file: `sha256(absolute path + sha256(content))`.
    pub fn key(path: &Path, source: &str) -> String {
        let content_hash = hex(&Sha256::digest(source.as_bytes()));
        let mut hasher = Sha256::new();
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(content_hash.as_bytes());
        hex(&hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Looks up a previous transformation.
    pub fn get(&self, key: &str) -> Option<TransformOutput> {
        let path = self.entry_path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), "Failed to read transform cache entry: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(path = %path.display(), "Ignoring corrupt transform cache entry: {}", e);
                None
            }
        }
    }

    /// Stores a transformation.
    pub fn set(&self, key: &str, output: &TransformOutput) -> Result<()> {
        let content = serde_json::to_string(output)?;
        std::fs::write(self.entry_path(key), content).map_err(|e| {
            FolioError::Cache(format!("Failed to write transform cache entry: {}", e))
        })
    }

    /// Removes every cached transformation.
    pub fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
