//! Slab allocator implementation

use super::size_class::{calculate_size_classes, SizeClass};
use super::slot::SlotId;
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Slab allocator for on-disk storage
///
/// Manages multiple size classes, each with its own file. Every slot starts
/// with a 4-byte little-endian length prefix.
pub struct SlabAllocator {
    base_path: PathBuf,
    /// Size classes (sorted by size)
    size_classes: Vec<RwLock<SizeClass>>,
    /// File handles for each size class (`None` for a class a reader found absent)
    files: Vec<Mutex<Option<File>>>,
}

pub(crate) fn open_file(path: &Path, read_only: bool, permissions: u32) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    if !read_only {
        options.write(true).create(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(permissions);
    }
    #[cfg(not(unix))]
    let _ = permissions;
    options.open(path)
}

impl SlabAllocator {
    /// Create or open the slab files under `base_path`
    ///
    /// # Arguments
    /// * `min_size` - Minimum slot size (default: 64 bytes)
    /// * `max_size` - Maximum slot size (default: 64 KB)
    /// * `permissions` - Mode bits for newly created slab files
    pub fn new<P: AsRef<Path>>(
        base_path: P,
        min_size: Option<usize>,
        max_size: Option<usize>,
        read_only: bool,
        permissions: u32,
    ) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        if !read_only {
            std::fs::create_dir_all(&base_path)
                .map_err(|e| Error::Storage(format!("Failed to create slab directory: {}", e)))?;
        }

        let min = min_size.unwrap_or(64);
        let max = max_size.unwrap_or(65536);

        let sizes = calculate_size_classes(min, max);
        if sizes.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "No slot size fits between {} and {}",
                min, max
            )));
        }
        info!(classes = sizes.len(), min, max, "Initializing slab allocator");

        let mut size_classes = Vec::with_capacity(sizes.len());
        let mut files = Vec::with_capacity(sizes.len());

        for (index, &size) in sizes.iter().enumerate() {
            size_classes.push(RwLock::new(SizeClass::new(index as u16, size)));

            let file_path = base_path.join(format!("slab_{:04}_{}.bin", index, size));
            let file = match open_file(&file_path, read_only, permissions) {
                Ok(file) => Some(file),
                // A reader never creates files; an absent class is simply empty
                Err(e) if read_only && e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(Error::Io(e)),
            };

            files.push(Mutex::new(file));
            debug!(path = ?file_path, "Opened slab file");
        }

        Ok(Self {
            base_path,
            size_classes,
            files,
        })
    }

    /// Rebuild free lists from the slots the metadata index still references
    pub fn restore<'a>(&self, live: impl IntoIterator<Item = &'a SlotId>) -> Result<()> {
        let mut per_class: HashMap<usize, BTreeSet<u64>> = HashMap::new();
        for slot in live {
            per_class.entry(slot.file_index()).or_default().insert(slot.offset);
        }

        let empty = BTreeSet::new();
        for (index, sc) in self.size_classes.iter().enumerate() {
            let file_len = match self.files[index].lock().as_ref() {
                Some(file) => file.metadata().map_err(Error::Io)?.len(),
                None => 0,
            };
            let live_offsets = per_class.get(&index).unwrap_or(&empty);
            sc.write().restore(file_len, live_offsets);
        }
        Ok(())
    }

    /// Allocate space for data of the given size
    ///
    /// Size is the payload; the 4-byte length prefix is added here.
    pub fn allocate(&self, size: usize) -> Result<SlotId> {
        let total_size = size + 4;

        let size_class_idx = self
            .size_classes
            .iter()
            .position(|sc| sc.read().can_fit(total_size))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Data size {} (+4 byte prefix = {}) exceeds maximum slab size",
                    size, total_size
                ))
            })?;

        let offset = self.size_classes[size_class_idx].write().allocate();

        let slot_id = SlotId::new(size_class_idx as u16, offset);
        debug!("Allocated {} bytes at {}", size, slot_id);

        Ok(slot_id)
    }

    /// Largest payload a single slot can hold
    pub fn max_payload(&self) -> usize {
        self.size_classes
            .last()
            .map(|sc| sc.read().slot_size.saturating_sub(4))
            .unwrap_or(0)
    }

    /// Free a previously allocated slot
    pub fn free(&self, slot_id: SlotId) -> Result<()> {
        let sc = self.size_classes.get(slot_id.file_index()).ok_or_else(|| {
            Error::Storage(format!("Invalid size class index: {}", slot_id.size_class))
        })?;
        sc.write().free(slot_id.offset);

        debug!("Freed slot {}", slot_id);
        Ok(())
    }

    /// Write data to a slot
    pub fn write(&self, slot_id: SlotId, data: &[u8]) -> Result<()> {
        let size_class_idx = slot_id.file_index();
        let sc = self.size_classes.get(size_class_idx).ok_or_else(|| {
            Error::Storage(format!("Invalid size class index: {}", size_class_idx))
        })?;

        let slot_size = sc.read().slot_size;
        let total_size = data.len() + 4;
        if total_size > slot_size {
            return Err(Error::InvalidArgument(format!(
                "Data size {} (+4 byte prefix = {}) exceeds slot size {}",
                data.len(),
                total_size,
                slot_size
            )));
        }

        let mut guard = self.files[size_class_idx].lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| Error::ReadOnly(format!("Slab file for class {} is absent", size_class_idx)))?;
        file.seek(SeekFrom::Start(slot_id.offset))
            .map_err(|e| Error::Storage(format!("Seek failed: {}", e)))?;

        let mut record = Vec::with_capacity(total_size);
        record.extend_from_slice(&(data.len() as u32).to_le_bytes());
        record.extend_from_slice(data);
        file.write_all(&record)
            .map_err(|e| Error::Storage(format!("Write failed: {}", e)))?;

        debug!("Wrote {} bytes to {}", data.len(), slot_id);
        Ok(())
    }

    /// Read data from a slot
    pub fn read(&self, slot_id: SlotId) -> Result<Vec<u8>> {
        let size_class_idx = slot_id.file_index();
        let slot_size = self
            .size_classes
            .get(size_class_idx)
            .ok_or_else(|| Error::Storage(format!("Invalid size class index: {}", size_class_idx)))?
            .read()
            .slot_size;

        let mut guard = self.files[size_class_idx].lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| Error::Storage(format!("Missing slab file for {}", slot_id)))?;
        file.seek(SeekFrom::Start(slot_id.offset))
            .map_err(|e| Error::Storage(format!("Seek failed: {}", e)))?;

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)
            .map_err(|e| Error::Storage(format!("Read failed: {}", e)))?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len + 4 > slot_size {
            return Err(Error::Storage(format!(
                "Corrupt length prefix {} in {}",
                len, slot_id
            )));
        }

        let mut data = vec![0u8; len];
        file.read_exact(&mut data)
            .map_err(|e| Error::Storage(format!("Read failed: {}", e)))?;

        debug!("Read {} bytes from {}", data.len(), slot_id);
        Ok(data)
    }

    pub fn stats(&self) -> SlabStats {
        let mut stats = SlabStats::default();

        for (i, sc) in self.size_classes.iter().enumerate() {
            let sc = sc.read();
            let class_stats = SizeClassStats {
                index: i,
                slot_size: sc.slot_size,
                total_slots: sc.total_slots(),
                free_slots: sc.free_count() as u64,
                allocated_slots: sc.total_slots() - sc.free_count() as u64,
            };
            stats.size_classes.push(class_stats);
            stats.total_allocated += class_stats.allocated_slots * sc.slot_size as u64;
        }

        stats
    }

    /// Flush all slab files to disk
    pub fn flush(&self) -> Result<()> {
        for file in self.files.iter() {
            if let Some(file) = file.lock().as_ref() {
                file.sync_all()
                    .map_err(|e| Error::Storage(format!("Flush failed: {}", e)))?;
            }
        }
        debug!(path = ?self.base_path, "Flushed slab files");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SlabStats {
    pub size_classes: Vec<SizeClassStats>,
    pub total_allocated: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct SizeClassStats {
    pub index: usize,
    pub slot_size: usize,
    pub total_slots: u64,
    pub free_slots: u64,
    pub allocated_slots: u64,
}
