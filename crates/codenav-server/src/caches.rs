//! Raw and processed document-symbol caches with versioned persistence.
//!
//! Two flavors are kept per server: the symbol tree exactly as parsed from
//! the wire ("raw") and the tree after per-language post-processing
//! ("processed"). Each entry records the content hash it was computed from,
//! so edits invalidate by construction, independent of mtimes.

use codenav_cache::{CacheConfig, CacheStats, LruCache, load_cache, save_cache};
use codenav_symbols::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// File name of the raw document-symbol cache.
pub const RAW_CACHE_FILENAME: &str = "raw_document_symbols.json";
/// File name of the processed document-symbol cache.
pub const PROCESSED_CACHE_FILENAME: &str = "document_symbols.json";

/// One cached symbol tree plus the content hash it belongs to.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedSymbols {
    /// Hash of the file contents the tree was computed from.
    pub content_hash: String,
    /// Symbol roots (bodies are never cached).
    pub roots: Arc<Vec<Symbol>>,
}

/// The two cache flavors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheFlavor {
    /// As parsed from the wire.
    Raw,
    /// After language policy post-processing.
    Processed,
}

impl CacheFlavor {
    /// Stable name used in persister keys and file names.
    pub fn name(self) -> &'static str {
        match self {
            CacheFlavor::Raw => "raw_symbols",
            CacheFlavor::Processed => "document_symbols",
        }
    }

    fn filename(self) -> &'static str {
        match self {
            CacheFlavor::Raw => RAW_CACHE_FILENAME,
            CacheFlavor::Processed => PROCESSED_CACHE_FILENAME,
        }
    }
}

/// Both symbol caches for one server, with modified tracking for the
/// async persister.
pub struct SymbolCaches {
    raw: LruCache<String, CachedSymbols>,
    processed: LruCache<String, CachedSymbols>,
    raw_modified: Arc<AtomicBool>,
    processed_modified: Arc<AtomicBool>,
    cache_dir: PathBuf,
}

/// Rough per-entry weight: enough to keep the byte bound meaningful
/// without serializing on every insert.
fn weigh(entry: &CachedSymbols) -> usize {
    fn weigh_symbol(symbol: &Symbol) -> usize {
        let own = 128
            + symbol.name.len()
            + symbol.detail.as_deref().map_or(0, str::len)
            + symbol.location.relative_path.len();
        own + symbol.children.iter().map(weigh_symbol).sum::<usize>()
    }
    entry.content_hash.len() + entry.roots.iter().map(weigh_symbol).sum::<usize>()
}

impl SymbolCaches {
    /// Create empty caches persisting under `cache_dir`.
    pub fn new(cache_dir: PathBuf, config: CacheConfig) -> Self {
        Self {
            raw: LruCache::new(config.clone(), weigh),
            processed: LruCache::new(config, weigh),
            raw_modified: Arc::new(AtomicBool::new(false)),
            processed_modified: Arc::new(AtomicBool::new(false)),
            cache_dir,
        }
    }

    fn cache(&self, flavor: CacheFlavor) -> &LruCache<String, CachedSymbols> {
        match flavor {
            CacheFlavor::Raw => &self.raw,
            CacheFlavor::Processed => &self.processed,
        }
    }

    fn modified_flag(&self, flavor: CacheFlavor) -> &AtomicBool {
        match flavor {
            CacheFlavor::Raw => &self.raw_modified,
            CacheFlavor::Processed => &self.processed_modified,
        }
    }

    /// Look up a tree for `relative_path`, honoring the content hash: a
    /// stale entry counts as a miss and is removed.
    pub fn get(
        &self,
        flavor: CacheFlavor,
        relative_path: &str,
        content_hash: &str,
    ) -> Option<Arc<Vec<Symbol>>> {
        let key = relative_path.to_string();
        let entry = self.cache(flavor).get(&key)?;
        if entry.content_hash == content_hash {
            Some(entry.roots)
        } else {
            self.cache(flavor).remove(&key);
            None
        }
    }

    /// Store a tree and mark the flavor modified for the persister.
    pub fn put(
        &self,
        flavor: CacheFlavor,
        relative_path: &str,
        content_hash: &str,
        roots: Arc<Vec<Symbol>>,
    ) {
        self.cache(flavor).put(
            relative_path.to_string(),
            CachedSymbols { content_hash: content_hash.to_string(), roots },
        );
        self.modified_flag(flavor).store(true, Ordering::SeqCst);
    }

    /// Whether the flavor changed since its last save.
    pub fn is_modified(&self, flavor: CacheFlavor) -> bool {
        self.modified_flag(flavor).load(Ordering::SeqCst)
    }

    /// Statistics for one flavor.
    pub fn stats(&self, flavor: CacheFlavor) -> CacheStats {
        self.cache(flavor).stats()
    }

    /// The on-disk path of one flavor's cache file.
    pub fn file_path(&self, flavor: CacheFlavor) -> PathBuf {
        self.cache_dir.join(flavor.filename())
    }

    /// Serializable snapshot of one flavor, keyed by repository-relative
    /// path.
    pub fn snapshot(&self, flavor: CacheFlavor) -> HashMap<String, CachedSymbols> {
        self.cache(flavor).snapshot().into_iter().collect()
    }

    /// Write one flavor to disk now, clearing its modified flag.
    pub fn save(&self, flavor: CacheFlavor, version: &str) -> std::io::Result<()> {
        let payload = self.snapshot(flavor);
        save_cache(&self.file_path(flavor), version, &payload)?;
        self.modified_flag(flavor).store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Write both flavors if modified.
    pub fn save_all(&self, version: &str) -> std::io::Result<()> {
        for flavor in [CacheFlavor::Raw, CacheFlavor::Processed] {
            if self.is_modified(flavor) {
                self.save(flavor, version)?;
            }
        }
        Ok(())
    }

    /// Shared handle to a flavor's modified flag, for persister callbacks
    /// that must not touch the cache itself.
    pub fn modified_handle(&self, flavor: CacheFlavor) -> Arc<AtomicBool> {
        match flavor {
            CacheFlavor::Raw => Arc::clone(&self.raw_modified),
            CacheFlavor::Processed => Arc::clone(&self.processed_modified),
        }
    }

    /// Load both flavors from disk, discarding files whose version stamp
    /// does not match.
    pub fn load_from_disk(&self, version: &str) {
        for flavor in [CacheFlavor::Raw, CacheFlavor::Processed] {
            let path = self.file_path(flavor);
            if let Some(payload) =
                load_cache::<HashMap<String, CachedSymbols>>(&path, version)
            {
                debug!(flavor = flavor.name(), entries = payload.len(), "loaded symbol cache");
                self.cache(flavor).load(payload);
            }
        }
    }
}
