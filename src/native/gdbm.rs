//! GNU dbm interface
//!
//! Fetches allocate. Errors land in the process-wide [`gdbm_errno`], which
//! is why callers must serialize access. Iteration is keyed: `nextkey` takes
//! the previous key and carries no other state.

use super::{store_options, StoreTuning};
use crate::error::Error;
use crate::flags::OpenMode;
use crate::storage::{SlabStore, WriteMode};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::debug;

pub const GDBM_NO_ERROR: i32 = 0;
pub const GDBM_MALLOC_ERROR: i32 = 1;
pub const GDBM_FILE_OPEN_ERROR: i32 = 3;
pub const GDBM_FILE_WRITE_ERROR: i32 = 4;
pub const GDBM_FILE_READ_ERROR: i32 = 6;
pub const GDBM_READER_CANT_DELETE: i32 = 11;
pub const GDBM_READER_CANT_STORE: i32 = 12;
pub const GDBM_ITEM_NOT_FOUND: i32 = 15;
pub const GDBM_CANNOT_REPLACE: i32 = 17;
pub const GDBM_ILLEGAL_DATA: i32 = 18;
pub const GDBM_OPT_ILLEGAL: i32 = 20;

/// Open modes
pub const GDBM_READER: i32 = 0;
pub const GDBM_WRITER: i32 = 1;
pub const GDBM_WRCREAT: i32 = 2;
pub const GDBM_NEWDB: i32 = 3;
/// Skip the fsync after every write
pub const GDBM_FAST: i32 = 0x10;

/// `store` flags
pub const GDBM_INSERT: i32 = 0;
pub const GDBM_REPLACE: i32 = 1;

/// `setopt` options
pub const GDBM_CACHESIZE: i32 = 1;

static GDBM_ERRNO: AtomicI32 = AtomicI32::new(GDBM_NO_ERROR);

pub fn gdbm_errno() -> i32 {
    GDBM_ERRNO.load(Ordering::SeqCst)
}

fn set_gdbm_errno(code: i32) {
    GDBM_ERRNO.store(code, Ordering::SeqCst);
}

fn io_code(e: &Error, fallback: i32) -> i32 {
    match e {
        Error::ReadOnly(_) => GDBM_READER_CANT_STORE,
        Error::InvalidArgument(_) => GDBM_ILLEGAL_DATA,
        _ => fallback,
    }
}

/// An open `GDBM_FILE`
pub struct GdbmFile {
    store: SlabStore,
    block_size: usize,
}

/// Open `name`. `read_write` is one of the mode constants, optionally or-ed
/// with `GDBM_FAST`. A `block_size` of 0 uses the file system block size.
pub fn gdbm_open(
    name: &Path,
    block_size: usize,
    read_write: i32,
    mode: u32,
    tuning: &StoreTuning,
) -> Option<GdbmFile> {
    let open_mode = match read_write & !GDBM_FAST {
        GDBM_READER => OpenMode::READER,
        GDBM_WRITER => OpenMode::WRITER,
        GDBM_WRCREAT => OpenMode::WRCREAT,
        GDBM_NEWDB => OpenMode::NEWDB,
        _ => {
            set_gdbm_errno(GDBM_FILE_OPEN_ERROR);
            return None;
        }
    };
    let write_mode = if read_write & GDBM_FAST != 0 {
        WriteMode::Buffered
    } else {
        WriteMode::WriteThrough
    };

    let options = store_options(open_mode, mode, write_mode, tuning);
    match SlabStore::open(name, &options) {
        Ok(store) => {
            let block_size = if block_size > 0 {
                block_size
            } else {
                fs_block_size(name).unwrap_or(tuning.page_size)
            };
            Some(GdbmFile {
                store,
                block_size,
            })
        }
        Err(e) => {
            debug!(path = ?name, error = %e, "gdbm_open failed");
            set_gdbm_errno(GDBM_FILE_OPEN_ERROR);
            None
        }
    }
}

#[cfg(unix)]
fn fs_block_size(path: &Path) -> Option<usize> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path)
        .ok()
        .map(|m| m.blksize() as usize)
        .filter(|&b| b > 0)
}

#[cfg(not(unix))]
fn fs_block_size(_path: &Path) -> Option<usize> {
    None
}

impl GdbmFile {
    /// Block size of the underlying file
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Set an option; `GDBM_CACHESIZE` takes a size in blocks
    pub fn setopt(&self, option: i32, value: usize) -> i32 {
        match option {
            GDBM_CACHESIZE => {
                self.store.set_cache_capacity(value.max(1));
                0
            }
            _ => {
                set_gdbm_errno(GDBM_OPT_ILLEGAL);
                -1
            }
        }
    }

    pub fn fetch(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.store.get(key) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                set_gdbm_errno(GDBM_ITEM_NOT_FOUND);
                None
            }
            Err(e) => {
                set_gdbm_errno(io_code(&e, GDBM_FILE_READ_ERROR));
                None
            }
        }
    }

    /// Returns 0 on success, 1 if `GDBM_INSERT` found the key, -1 on error
    pub fn store(&self, key: &[u8], content: &[u8], flag: i32) -> i32 {
        if self.store.is_read_only() {
            set_gdbm_errno(GDBM_READER_CANT_STORE);
            return -1;
        }
        match self.store.put(key, content, flag == GDBM_REPLACE) {
            Ok(true) => 0,
            Ok(false) => {
                set_gdbm_errno(GDBM_CANNOT_REPLACE);
                1
            }
            Err(e) => {
                set_gdbm_errno(io_code(&e, GDBM_FILE_WRITE_ERROR));
                -1
            }
        }
    }

    pub fn delete(&self, key: &[u8]) -> i32 {
        if self.store.is_read_only() {
            set_gdbm_errno(GDBM_READER_CANT_DELETE);
            return -1;
        }
        match self.store.delete(key) {
            Ok(true) => 0,
            Ok(false) => {
                set_gdbm_errno(GDBM_ITEM_NOT_FOUND);
                -1
            }
            Err(e) => {
                set_gdbm_errno(io_code(&e, GDBM_FILE_WRITE_ERROR));
                -1
            }
        }
    }

    pub fn firstkey(&self) -> Option<Vec<u8>> {
        let key = self.store.first_key();
        if key.is_none() {
            set_gdbm_errno(GDBM_ITEM_NOT_FOUND);
        }
        key
    }

    pub fn nextkey(&self, key: &[u8]) -> Option<Vec<u8>> {
        let next = self.store.next_key(key);
        if next.is_none() {
            set_gdbm_errno(GDBM_ITEM_NOT_FOUND);
        }
        next
    }

    /// Rewrite the file to drop space held by deleted and replaced entries
    pub fn reorganize(&self) -> i32 {
        if self.store.is_read_only() {
            set_gdbm_errno(GDBM_READER_CANT_STORE);
            return -1;
        }
        match self.store.compact_metadata() {
            Ok(()) => 0,
            Err(e) => {
                set_gdbm_errno(io_code(&e, GDBM_FILE_WRITE_ERROR));
                -1
            }
        }
    }

    pub fn sync(&self) {
        if let Err(e) = self.store.flush() {
            set_gdbm_errno(io_code(&e, GDBM_FILE_WRITE_ERROR));
        }
    }

    pub fn close(&self) {
        self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[test]
    fn test_store_and_errno() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = gdbm_open(
            &dir.path().join("g.db"),
            0,
            GDBM_WRCREAT | GDBM_FAST,
            0o600,
            &StoreTuning::default(),
        )
        .expect("gdbm_open");

        assert_eq!(db.store(b"k", b"v", GDBM_INSERT), 0);
        assert_eq!(db.store(b"k", b"w", GDBM_INSERT), 1);
        assert_eq!(db.fetch(b"k"), Some(b"v".to_vec()));
        assert_eq!(db.store(b"k", b"w", GDBM_REPLACE), 0);
        assert_eq!(db.fetch(b"k"), Some(b"w".to_vec()));
        assert!(db.block_size() > 0);
        assert_eq!(db.setopt(GDBM_CACHESIZE, 8), 0);
        assert_eq!(db.setopt(99, 8), -1);
        Ok(())
    }

    #[test]
    fn test_keyed_iteration() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = gdbm_open(&dir.path().join("i.db"), 0, GDBM_NEWDB, 0o600, &StoreTuning::default())
            .expect("gdbm_open");
        db.store(b"x", b"1", GDBM_INSERT);
        db.store(b"y", b"2", GDBM_INSERT);

        db.store(b"z", b"3", GDBM_INSERT);
        assert_eq!(db.delete(b"z"), 0);
        assert_eq!(db.reorganize(), 0);

        let first = db.firstkey().unwrap();
        let second = db.nextkey(&first).unwrap();
        assert_eq!((first.as_slice(), second.as_slice()), (&b"x"[..], &b"y"[..]));
        assert!(db.nextkey(&second).is_none());
        Ok(())
    }

    #[test]
    fn test_reader_cannot_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("r.db");
        let writer = gdbm_open(&path, 0, GDBM_WRCREAT, 0o600, &StoreTuning::default()).unwrap();
        writer.store(b"k", b"v", GDBM_INSERT);
        writer.close();
        drop(writer);

        let reader = gdbm_open(&path, 0, GDBM_READER, 0o600, &StoreTuning::default()).unwrap();
        assert_eq!(reader.fetch(b"k"), Some(b"v".to_vec()));
        assert_eq!(reader.store(b"k", b"w", GDBM_REPLACE), -1);
        assert_eq!(reader.delete(b"k"), -1);
        Ok(())
    }
}
