//! Key → slot index backed by an append-only metadata log
//!
//! No traditional WAL: every mutation appends one self-checking batch.
//!
//! ```text
//! Metadata Log:
//! [Batch 1: {key1→slot1, key2→slot2}]  ← append
//! [Batch 2: {key3→slot3}]               ← append
//! [Batch 3: {key1→slot4, key2→∅}]       ← key1 moved, key2 deleted
//! ```
//!
//! Recovery replays batches in order, last write wins. A torn or corrupt tail
//! ends recovery; everything before it is kept and a writer cuts the tail off
//! before appending again.

use super::allocator::open_file;
use super::slot::{SlotChain, SlotId};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One index mutation; `None` is a tombstone
pub type Mapping = (Vec<u8>, Option<SlotChain>);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataBatch {
    /// Batch sequence number (monotonically increasing)
    pub sequence: u64,
    /// Milliseconds since epoch
    pub timestamp: u64,
    pub mappings: Vec<Mapping>,
}

fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc.rotate_left(5) ^ (b as u32))
}

impl MetadataBatch {
    pub fn new(sequence: u64, mappings: Vec<Mapping>) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            sequence,
            timestamp,
            mappings,
        }
    }

    /// Format: [4-byte length][json data][4-byte checksum]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)
            .map_err(|e| Error::SerializationError(format!("Failed to serialize batch: {}", e)))?;

        let mut result = Vec::with_capacity(json.len() + 8);
        result.extend_from_slice(&(json.len() as u32).to_le_bytes());
        result.extend_from_slice(&json);
        result.extend_from_slice(&checksum(&json).to_le_bytes());

        Ok(result)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(Error::Storage("Batch too short".to_string()));
        }

        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if bytes.len() < len + 8 {
            return Err(Error::Storage(format!(
                "Incomplete batch: expected {} bytes, got {}",
                len + 8,
                bytes.len()
            )));
        }

        let json = &bytes[4..4 + len];
        let stored = u32::from_le_bytes([
            bytes[4 + len],
            bytes[5 + len],
            bytes[6 + len],
            bytes[7 + len],
        ]);
        if stored != checksum(json) {
            return Err(Error::Storage("Checksum mismatch".to_string()));
        }

        serde_json::from_slice(json)
            .map_err(|e| Error::SerializationError(format!("Failed to deserialize batch: {}", e)))
    }
}

/// Whether every batch is fsynced as it is appended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WriteThrough,
    /// Batches reach the OS immediately but are only fsynced by `sync`
    Buffered,
}

pub struct MetadataStore {
    log_path: PathBuf,
    /// Append handle; `None` when opened read-only
    log: Mutex<Option<File>>,
    index: RwLock<BTreeMap<Vec<u8>, SlotChain>>,
    next_sequence: Mutex<u64>,
    write_mode: WriteMode,
    permissions: u32,
}

impl MetadataStore {
    /// Create or open a metadata store under `base_path`
    pub fn new<P: AsRef<Path>>(
        base_path: P,
        read_only: bool,
        write_mode: WriteMode,
        permissions: u32,
    ) -> Result<Self> {
        let base_path = base_path.as_ref();
        if !read_only {
            std::fs::create_dir_all(base_path)
                .map_err(|e| Error::Storage(format!("Failed to create metadata dir: {}", e)))?;
        }

        let log_path = base_path.join("metadata.log");
        let log = if read_only {
            None
        } else {
            let mut options = OpenOptions::new();
            options.create(true).append(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(permissions);
            }
            Some(options.open(&log_path).map_err(Error::Io)?)
        };

        let store = Self {
            log_path,
            log: Mutex::new(log),
            index: RwLock::new(BTreeMap::new()),
            next_sequence: Mutex::new(0),
            write_mode,
            permissions,
        };

        store.recover()?;
        Ok(store)
    }

    fn recover(&self) -> Result<()> {
        if !self.log_path.exists() {
            info!("No metadata log found, starting fresh");
            return Ok(());
        }

        let file = open_file(&self.log_path, true, self.permissions).map_err(Error::Io)?;
        let file_len = file.metadata().map_err(Error::Io)?.len();
        let mut reader = BufReader::new(file);

        let mut index = BTreeMap::new();
        let mut max_sequence = None;
        let mut batches_recovered = 0;
        // End of the last batch that replayed cleanly
        let mut good_len: u64 = 0;

        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    warn!("Error reading batch length: {}", e);
                    break;
                }
            }

            let len = u32::from_le_bytes(len_bytes) as u64;
            let remaining = file_len.saturating_sub(good_len + 4);
            if len + 4 > remaining {
                warn!(len, remaining, "Batch runs past the end of the metadata log, ignoring");
                break;
            }

            let mut batch_bytes = vec![0u8; len as usize + 8];
            batch_bytes[0..4].copy_from_slice(&len_bytes);
            if let Err(e) = reader.read_exact(&mut batch_bytes[4..]) {
                warn!(error = %e, "Torn batch at end of metadata log, ignoring");
                break;
            }

            match MetadataBatch::from_bytes(&batch_bytes) {
                Ok(batch) => {
                    for (key, slots) in batch.mappings {
                        match slots {
                            Some(slots) => index.insert(key, slots),
                            None => index.remove(&key),
                        };
                    }
                    max_sequence = Some(max_sequence.unwrap_or(0).max(batch.sequence));
                    batches_recovered += 1;
                    good_len += batch_bytes.len() as u64;
                }
                Err(e) => {
                    warn!("Failed to deserialize batch: {}", e);
                    break;
                }
            }
        }

        if good_len < file_len {
            if let Some(log) = self.log.lock().as_ref() {
                warn!(
                    path = ?self.log_path,
                    discarded = file_len - good_len,
                    "Truncating metadata log to its last good batch"
                );
                log.set_len(good_len)
                    .and_then(|_| log.sync_all())
                    .map_err(|e| Error::Storage(format!("Failed to truncate log: {}", e)))?;
            }
        }

        let keys = index.len();
        *self.index.write() = index;
        *self.next_sequence.lock() = max_sequence.map(|s| s + 1).unwrap_or(0);

        info!(
            path = ?self.log_path,
            batches = batches_recovered,
            keys,
            "Metadata recovery complete"
        );
        Ok(())
    }

    /// Append a batch, then apply it to the in-memory index
    pub fn write_batch(&self, mappings: Vec<Mapping>) -> Result<()> {
        if mappings.is_empty() {
            return Ok(());
        }

        let mut log = self.log.lock();
        let file = log
            .as_mut()
            .ok_or_else(|| Error::ReadOnly("Metadata log opened read-only".to_string()))?;

        let sequence = {
            let mut seq = self.next_sequence.lock();
            let s = *seq;
            *seq += 1;
            s
        };

        let batch = MetadataBatch::new(sequence, mappings);
        let bytes = batch.to_bytes()?;

        file.write_all(&bytes)
            .map_err(|e| Error::Storage(format!("Failed to write batch: {}", e)))?;
        if self.write_mode == WriteMode::WriteThrough {
            file.sync_all()
                .map_err(|e| Error::Storage(format!("Failed to sync log: {}", e)))?;
        }

        let entries = batch.mappings.len();
        {
            let mut index = self.index.write();
            for (key, slots) in batch.mappings {
                match slots {
                    Some(slots) => index.insert(key, slots),
                    None => index.remove(&key),
                };
            }
        }

        debug!(sequence, entries, "Wrote metadata batch");
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Option<SlotChain> {
        self.index.read().get(key).cloned()
    }

    pub fn insert(&self, key: Vec<u8>, slots: SlotChain) -> Result<()> {
        self.write_batch(vec![(key, Some(slots))])
    }

    /// Durably remove a key (tombstone)
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.write_batch(vec![(key.to_vec(), None)])
    }

    /// Smallest key in the index
    pub fn first_key(&self) -> Option<Vec<u8>> {
        self.index.read().keys().next().cloned()
    }

    /// Smallest key strictly greater than `after`
    pub fn next_key(&self, after: &[u8]) -> Option<Vec<u8>> {
        self.index
            .read()
            .range::<[u8], _>((Bound::Excluded(after), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone())
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.index.read().keys().cloned().collect()
    }

    pub fn live_slots(&self) -> Vec<SlotId> {
        self.index.read().values().flatten().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Force appended batches to disk
    pub fn sync(&self) -> Result<()> {
        if let Some(file) = self.log.lock().as_mut() {
            file.flush()
                .and_then(|_| file.sync_all())
                .map_err(|e| Error::Storage(format!("Failed to sync log: {}", e)))?;
        }
        Ok(())
    }

    /// Rewrite the log as a single batch holding the live index
    pub fn compact(&self) -> Result<()> {
        let mut log = self.log.lock();
        if log.is_none() {
            return Err(Error::ReadOnly("Metadata log opened read-only".to_string()));
        }

        info!(path = ?self.log_path, "Compacting metadata log");

        let mappings: Vec<Mapping> = self
            .index
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        let bytes = MetadataBatch::new(0, mappings).to_bytes()?;

        let temp_path = self.log_path.with_extension("log.tmp");
        {
            let mut temp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| Error::Storage(format!("Failed to create temp log: {}", e)))?;
            temp.write_all(&bytes)
                .map_err(|e| Error::Storage(format!("Failed to write compacted log: {}", e)))?;
            temp.sync_all()
                .map_err(|e| Error::Storage(format!("Failed to sync compacted log: {}", e)))?;
        }

        std::fs::rename(&temp_path, &self.log_path)
            .map_err(|e| Error::Storage(format!("Failed to rename log: {}", e)))?;

        *log = Some(
            OpenOptions::new()
                .append(true)
                .open(&self.log_path)
                .map_err(Error::Io)?,
        );
        *self.next_sequence.lock() = 1;

        info!("Log compaction complete");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn log_path(&self) -> &Path {
        &self.log_path
    }
}
