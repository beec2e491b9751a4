//! Slab-backed page store
//!
//! Combines SlabAllocator + MetadataStore + Compression + Cache. This is the
//! on-disk substrate every native dbm library in this crate sits on.
//!
//! # Layout
//!
//! ```text
//! <path>/
//!   ├─→ data/slab_0000_64.bin ...   (size-classed slot files)
//!   └─→ metadata/metadata.log       (key → slot batches)
//! ```

use super::allocator::SlabAllocator;
use super::cache::SlabCache;
use super::compression::{compress, decompress, CompressionAlgorithm};
use super::metadata::{MetadataStore, WriteMode};
use super::slot::{SlotChain, SlotId};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How to open a [`SlabStore`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub read_only: bool,
    /// Create the store if it does not exist
    pub create: bool,
    /// Discard any existing contents
    pub truncate: bool,
    /// Mode bits for newly created files
    pub permissions: u32,
    pub write_mode: WriteMode,
    pub min_slot_size: usize,
    pub max_slot_size: usize,
    pub compression: CompressionAlgorithm,
    /// Read cache capacity in entries
    pub cache_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            create: true,
            truncate: false,
            permissions: 0o600,
            write_mode: WriteMode::Buffered,
            min_slot_size: 64,
            max_slot_size: 65536,
            compression: CompressionAlgorithm::None,
            cache_capacity: 1000,
        }
    }
}

/// Key/value page store
pub struct SlabStore {
    path: PathBuf,
    allocator: SlabAllocator,
    metadata: MetadataStore,
    cache: SlabCache,
    compression: CompressionAlgorithm,
    read_only: bool,
    /// Writers (insert, put, delete, compaction) take the write side so that
    /// no reader follows a slot that is being freed and reused
    lock: RwLock<()>,
}

impl SlabStore {
    pub fn open<P: AsRef<Path>>(path: P, options: &StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = path.join("metadata").is_dir();

        if !exists && (options.read_only || !options.create) {
            return Err(Error::NotFound(format!("{}", path.display())));
        }
        if path.exists() && !path.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "{} exists and is not a store directory",
                path.display()
            )));
        }
        if exists && options.truncate && !options.read_only {
            info!(path = ?path, "Truncating existing store");
            std::fs::remove_dir_all(&path)
                .map_err(|e| Error::Storage(format!("Failed to truncate store: {}", e)))?;
        }

        let allocator = SlabAllocator::new(
            path.join("data"),
            Some(options.min_slot_size),
            Some(options.max_slot_size),
            options.read_only,
            options.permissions,
        )?;
        let metadata = MetadataStore::new(
            path.join("metadata"),
            options.read_only,
            options.write_mode,
            options.permissions,
        )?;
        allocator.restore(&metadata.live_slots())?;

        info!(
            path = ?path,
            keys = metadata.len(),
            read_only = options.read_only,
            "Opened slab store"
        );

        Ok(Self {
            path,
            allocator,
            metadata,
            cache: SlabCache::new(options.cache_capacity),
            compression: options.compression,
            read_only: options.read_only,
            lock: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Get value for a key (with caching)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        // Writers free slots only under the write side
        let _read = self.lock.read();
        if let Some(cached) = self.cache.get(key) {
            return Ok(Some(cached));
        }

        let slots = match self.metadata.get(key) {
            Some(slots) => slots,
            None => return Ok(None),
        };

        let stored = self.read_chain(&slots)?;
        let data = decompress(&stored, self.compression)?;
        self.cache.put(key.to_vec(), data.clone());

        Ok(Some(data))
    }

    fn read_chain(&self, slots: &[SlotId]) -> Result<Vec<u8>> {
        if let [slot] = slots {
            return self.allocator.read(*slot);
        }
        let mut stored = Vec::with_capacity(slots.len() * self.allocator.max_payload());
        for slot in slots {
            stored.extend_from_slice(&self.allocator.read(*slot)?);
        }
        Ok(stored)
    }

    /// Write `data` into as many slots as it needs
    fn write_chain(&self, data: &[u8]) -> Result<SlotChain> {
        let chunk = self.allocator.max_payload().max(1);
        let pieces: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(chunk).collect()
        };

        let mut slots = SlotChain::with_capacity(pieces.len());
        for piece in pieces {
            let written = self.allocator.allocate(piece.len()).and_then(|slot| {
                slots.push(slot);
                self.allocator.write(slot, piece)
            });
            if let Err(e) = written {
                self.free_chain(&slots)?;
                return Err(e);
            }
        }
        Ok(slots)
    }

    fn free_chain(&self, slots: &[SlotId]) -> Result<()> {
        for slot in slots {
            self.allocator.free(*slot)?;
        }
        Ok(())
    }

    /// Store a value.
    ///
    /// With `overwrite == false` an existing key is left untouched and
    /// `Ok(false)` is returned.
    pub fn put(&self, key: &[u8], value: &[u8], overwrite: bool) -> Result<bool> {
        if self.read_only {
            return Err(Error::ReadOnly(format!("{}", self.path.display())));
        }

        let _write = self.lock.write();
        let old_slots = self.metadata.get(key);
        if old_slots.is_some() && !overwrite {
            return Ok(false);
        }

        let compressed = compress(value, self.compression)?;
        let slots = self.write_chain(&compressed)?;
        let chained = slots.len();
        if let Err(e) = self.metadata.insert(key.to_vec(), slots.clone()) {
            self.free_chain(&slots)?;
            return Err(e);
        }

        // Old slots are released only once the new mapping is logged
        if let Some(old) = old_slots {
            self.free_chain(&old)?;
        }
        self.cache.remove(key);

        debug!(
            key_len = key.len(),
            value_len = value.len(),
            stored_len = compressed.len(),
            slots = chained,
            "Put key-value"
        );
        Ok(true)
    }

    /// Returns `Ok(false)` when the key was absent
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        if self.read_only {
            return Err(Error::ReadOnly(format!("{}", self.path.display())));
        }

        let _write = self.lock.write();
        let slots = match self.metadata.get(key) {
            Some(slots) => slots,
            None => return Ok(false),
        };

        self.metadata.remove(key)?;
        self.free_chain(&slots)?;
        self.cache.remove(key);

        debug!(key_len = key.len(), "Deleted key");
        Ok(true)
    }

    pub fn first_key(&self) -> Option<Vec<u8>> {
        self.metadata.first_key()
    }

    /// Key following `after` in store order
    pub fn next_key(&self, after: &[u8]) -> Option<Vec<u8>> {
        self.metadata.next_key(after)
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.metadata.keys()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.metadata.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn set_cache_capacity(&self, entries: usize) {
        self.cache.resize(entries);
    }

    /// Flush slab files and the metadata log to disk
    pub fn flush(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.allocator.flush()?;
        self.metadata.sync()
    }

    pub fn compact_metadata(&self) -> Result<()> {
        let _write = self.lock.write();
        self.metadata.compact()
    }

    pub fn stats(&self) -> StorageStats {
        let slab_stats = self.allocator.stats();
        let cache_stats = self.cache.stats();
        StorageStats {
            key_count: self.len(),
            total_allocated: slab_stats.total_allocated,
            size_classes: slab_stats.size_classes.len(),
            cache_hits: cache_stats.hits,
            cache_misses: cache_stats.misses,
            cache_hit_rate: cache_stats.hit_rate,
        }
    }
}

#[derive(Debug)]
pub struct StorageStats {
    pub key_count: usize,
    pub total_allocated: u64,
    pub size_classes: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> StoreOptions {
        StoreOptions {
            max_slot_size: 512,
            ..StoreOptions::default()
        }
    }

    #[test]
    fn test_slab_store_basic() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let store = SlabStore::open(temp_dir.path().join("db"), &options())?;

        assert!(store.put(b"key1", b"value1", true)?);
        assert!(store.put(b"key2", b"value2", true)?);

        assert_eq!(store.get(b"key1")?, Some(b"value1".to_vec()));
        assert_eq!(store.get(b"key2")?, Some(b"value2".to_vec()));
        assert_eq!(store.get(b"key3")?, None);
        assert!(store.contains_key(b"key1"));
        Ok(())
    }

    #[test]
    fn test_insert_does_not_overwrite() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let store = SlabStore::open(temp_dir.path().join("db"), &options())?;

        assert!(store.put(b"key1", b"initial", false)?);
        assert!(!store.put(b"key1", b"second", false)?);
        assert_eq!(store.get(b"key1")?, Some(b"initial".to_vec()));

        assert!(store.put(b"key1", b"updated", true)?);
        assert_eq!(store.get(b"key1")?, Some(b"updated".to_vec()));
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn test_delete_is_durable() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("db");
        {
            let store = SlabStore::open(&path, &options())?;
            store.put(b"key1", b"value1", true)?;
            store.put(b"key2", b"value2", true)?;
            assert!(store.delete(b"key1")?);
            assert!(!store.delete(b"key3")?);
            store.flush()?;
        }

        let store = SlabStore::open(&path, &options())?;
        assert_eq!(store.get(b"key1")?, None);
        assert_eq!(store.keys(), vec![b"key2".to_vec()]);
        Ok(())
    }

    #[test]
    fn test_reopen_then_write_keeps_old_values() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("db");
        {
            let store = SlabStore::open(&path, &options())?;
            for i in 0..20 {
                store.put(format!("key{}", i).as_bytes(), b"old", true)?;
            }
            store.flush()?;
        }

        let store = SlabStore::open(&path, &options())?;
        store.put(b"fresh", b"new", true)?;
        for i in 0..20 {
            assert_eq!(store.get(format!("key{}", i).as_bytes())?, Some(b"old".to_vec()));
        }
        Ok(())
    }

    #[test]
    fn test_open_modes() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("db");

        let no_create = StoreOptions {
            create: false,
            ..options()
        };
        assert!(matches!(SlabStore::open(&path, &no_create), Err(Error::NotFound(_))));

        SlabStore::open(&path, &options())?.put(b"k", b"v", true)?;

        let reader = StoreOptions {
            read_only: true,
            ..options()
        };
        let store = SlabStore::open(&path, &reader)?;
        assert_eq!(store.get(b"k")?, Some(b"v".to_vec()));
        assert!(matches!(store.put(b"k", b"w", true), Err(Error::ReadOnly(_))));
        drop(store);

        let truncate = StoreOptions {
            truncate: true,
            ..options()
        };
        assert!(SlabStore::open(&path, &truncate)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_zstd_store_round_trip() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let opts = StoreOptions {
            compression: CompressionAlgorithm::Zstd,
            ..options()
        };
        let store = SlabStore::open(temp_dir.path().join("db"), &opts)?;
        let value = b"objectClass: person ".repeat(40);
        store.put(b"entry", &value, true)?;
        assert_eq!(store.get(b"entry")?, Some(value));
        Ok(())
    }

    #[test]
    fn test_slab_store_stats() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let store = SlabStore::open(temp_dir.path().join("db"), &options())?;

        store.put(b"key1", b"value1", true)?;
        store.put(b"key2", b"value2", true)?;
        store.get(b"key1")?;
        store.get(b"key1")?;

        let stats = store.stats();
        assert_eq!(stats.key_count, 2);
        assert!(stats.total_allocated > 0);
        assert!(stats.size_classes > 0);
        assert_eq!(stats.cache_hits, 1);
        Ok(())
    }

    #[test]
    fn test_values_larger_than_a_slot_are_chained() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("db");
        // 512-byte slots; this needs a chain of several
        let big: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        {
            let store = SlabStore::open(&path, &options())?;
            store.put(b"big", &big, true)?;
            store.put(b"small", b"s", true)?;
            assert_eq!(store.get(b"big")?, Some(big.clone()));

            // Replacing with a shorter value releases the extra slots
            store.put(b"big", b"short", true)?;
            store.put(b"big", &big, true)?;
            store.flush()?;
        }

        let store = SlabStore::open(&path, &options())?;
        assert_eq!(store.get(b"big")?, Some(big));
        assert_eq!(store.get(b"small")?, Some(b"s".to_vec()));
        assert!(store.delete(b"big")?);
        assert_eq!(store.get(b"big")?, None);
        Ok(())
    }

    #[test]
    fn test_readers_never_see_a_reused_slot() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let store = std::sync::Arc::new(SlabStore::open(temp_dir.path().join("db"), &options())?);
        store.put(b"a", b"a0", true)?;

        let writer = {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || -> Result<()> {
                for i in 0..200 {
                    store.put(b"a", format!("a{}", i).as_bytes(), true)?;
                    store.put(b"b", format!("b{}", i).as_bytes(), true)?;
                }
                Ok(())
            })
        };
        for _ in 0..400 {
            let value = store.get(b"a")?.unwrap_or_default();
            assert_eq!(value.first(), Some(&b'a'));
        }
        writer.join().expect("writer panicked")?;
        Ok(())
    }

    #[test]
    fn test_compaction_keeps_live_keys() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("db");
        {
            let store = SlabStore::open(&path, &options())?;
            for i in 0..10 {
                store.put(format!("key{}", i).as_bytes(), b"v1", true)?;
                store.put(format!("key{}", i).as_bytes(), b"v2", true)?;
            }
            store.delete(b"key0")?;
            store.compact_metadata()?;
            store.put(b"after", b"compaction", true)?;
        }

        let store = SlabStore::open(&path, &options())?;
        assert_eq!(store.len(), 10);
        assert_eq!(store.get(b"key5")?, Some(b"v2".to_vec()));
        assert_eq!(store.get(b"key0")?, None);
        assert_eq!(store.get(b"after")?, Some(b"compaction".to_vec()));
        Ok(())
    }
}
