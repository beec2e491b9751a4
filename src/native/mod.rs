//! Native dbm libraries
//!
//! Each submodule reproduces the calling convention of one classic dbm
//! library on top of [`SlabStore`]: who owns fetched memory, how return codes
//! are signed, where the error code lives and how iteration is positioned.
//! The facade in [`crate::backend`] translates these conventions into one
//! uniform contract.
//!
//! | Library | Fetch memory | Error channel | Iteration |
//! |---|---|---|---|
//! | `db185` | borrowed | `errno` | internal `seq` position |
//! | `db2` | allocated | return code | explicit cursor |
//! | `gdbm` | allocated | global `gdbm_errno` | keyed `nextkey` |
//! | `mdbm` | caller buffer | `errno` | internal position |
//! | `ndbm` | borrowed | per-handle `dbm_error` | internal position |

pub mod db185;
pub mod db2;
pub mod errno;
pub mod gdbm;
pub mod mdbm;
pub mod ndbm;

use crate::flags::OpenMode;
use crate::storage::{CompressionAlgorithm, StoreOptions, WriteMode};

/// Page-store tuning the backends pass down to every native open
#[derive(Debug, Clone)]
pub struct StoreTuning {
    pub min_slot_size: usize,
    pub max_slot_size: usize,
    pub compression: CompressionAlgorithm,
    /// Read cache capacity in entries
    pub cache_capacity: usize,
    /// Bytes per cache entry when a byte-sized cache hint is converted
    pub page_size: usize,
}

impl Default for StoreTuning {
    fn default() -> Self {
        let defaults = StoreOptions::default();
        Self {
            min_slot_size: defaults.min_slot_size,
            max_slot_size: defaults.max_slot_size,
            compression: defaults.compression,
            cache_capacity: defaults.cache_capacity,
            page_size: 4096,
        }
    }
}

impl StoreTuning {
    /// Convert a cache hint in bytes to a number of cached entries
    pub fn cache_entries(&self, bytes: usize) -> usize {
        (bytes / self.page_size.max(1)).max(1)
    }
}

pub(crate) fn store_options(
    mode: OpenMode,
    permissions: u32,
    write_mode: WriteMode,
    tuning: &StoreTuning,
) -> StoreOptions {
    StoreOptions {
        read_only: !mode.is_writable(),
        create: mode.contains(OpenMode::CREATE),
        truncate: mode.contains(OpenMode::TRUNCATE),
        permissions,
        write_mode,
        min_slot_size: tuning.min_slot_size,
        max_slot_size: tuning.max_slot_size,
        compression: tuning.compression,
        cache_capacity: tuning.cache_capacity,
    }
}
