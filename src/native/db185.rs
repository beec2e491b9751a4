//! Berkeley DB 1.85 `dbopen` interface
//!
//! `get` and `seq` hand back memory owned by the handle; it stays valid only
//! until the next call on the same handle. Failures return `-1` and leave the
//! reason in [`errno`](super::errno).

use super::errno::{self, set_errno};
use super::{store_options, StoreTuning};
use crate::flags::OpenMode;
use crate::storage::{SlabStore, WriteMode};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::path::Path;
use tracing::debug;

pub const RET_ERROR: i32 = -1;
pub const RET_SUCCESS: i32 = 0;
pub const RET_SPECIAL: i32 = 1;

/// `put` flag: fail with `RET_SPECIAL` if the key exists
pub const R_NOOVERWRITE: u32 = 8;
pub const R_FIRST: u32 = 3;
pub const R_NEXT: u32 = 7;

/// Per-access-method open parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenInfo {
    /// Cache size in bytes, 0 for the library default
    pub cachesize: usize,
}

#[derive(Default)]
struct Scratch {
    key: Vec<u8>,
    data: Vec<u8>,
    cursor: Option<Vec<u8>>,
}

/// An open `DB *`
pub struct Db {
    store: SlabStore,
    scratch: Mutex<Scratch>,
}

/// Open a database; `None` with `errno` set on failure
pub fn dbopen(
    path: &Path,
    flags: OpenMode,
    mode: u32,
    info: &OpenInfo,
    tuning: &StoreTuning,
) -> Option<Db> {
    let mut tuning = tuning.clone();
    if info.cachesize > 0 {
        tuning.cache_capacity = tuning.cache_entries(info.cachesize);
    }

    let options = store_options(flags, mode, WriteMode::Buffered, &tuning);
    match SlabStore::open(path, &options) {
        Ok(store) => Some(Db {
            store,
            scratch: Mutex::new(Scratch::default()),
        }),
        Err(e) => {
            debug!(path = ?path, error = %e, "dbopen failed");
            set_errno(e.errno());
            None
        }
    }
}

impl Db {
    /// Look up `key`. `Err` carries the return code: `RET_SPECIAL` when the
    /// key is absent, `RET_ERROR` with `errno` set otherwise.
    pub fn get(&self, key: &[u8], _flags: u32) -> Result<MappedMutexGuard<'_, [u8]>, i32> {
        match self.store.get(key) {
            Ok(Some(value)) => {
                let mut scratch = self.scratch.lock();
                scratch.data = value;
                Ok(MutexGuard::map(scratch, |s| s.data.as_mut_slice()))
            }
            Ok(None) => Err(RET_SPECIAL),
            Err(e) => {
                set_errno(e.errno());
                Err(RET_ERROR)
            }
        }
    }

    pub fn put(&self, key: &[u8], data: &[u8], flags: u32) -> i32 {
        let overwrite = flags & R_NOOVERWRITE == 0;
        match self.store.put(key, data, overwrite) {
            Ok(true) => RET_SUCCESS,
            Ok(false) => RET_SPECIAL,
            Err(e) => {
                set_errno(e.errno());
                RET_ERROR
            }
        }
    }

    pub fn del(&self, key: &[u8], _flags: u32) -> i32 {
        match self.store.delete(key) {
            Ok(true) => RET_SUCCESS,
            Ok(false) => RET_SPECIAL,
            Err(e) => {
                set_errno(e.errno());
                RET_ERROR
            }
        }
    }

    /// Sequential key access. `R_FIRST` rewinds; `R_NEXT` continues from the
    /// handle's position (or starts at the first key if there is none).
    pub fn seq(&self, flags: u32) -> Result<MappedMutexGuard<'_, [u8]>, i32> {
        let mut scratch = self.scratch.lock();
        let next = match flags {
            R_FIRST => self.store.first_key(),
            R_NEXT => match scratch.cursor.as_deref() {
                Some(position) => self.store.next_key(position),
                None => self.store.first_key(),
            },
            _ => {
                set_errno(errno::EINVAL);
                return Err(RET_ERROR);
            }
        };

        match next {
            Some(key) => {
                scratch.cursor = Some(key.clone());
                scratch.key = key;
                Ok(MutexGuard::map(scratch, |s| s.key.as_mut_slice()))
            }
            None => {
                scratch.cursor = None;
                Err(RET_SPECIAL)
            }
        }
    }

    pub fn sync(&self, _flags: u32) -> i32 {
        match self.store.flush() {
            Ok(()) => RET_SUCCESS,
            Err(e) => {
                set_errno(e.errno());
                RET_ERROR
            }
        }
    }

    pub fn close(&self) -> i32 {
        self.scratch.lock().cursor = None;
        self.sync(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    fn open(dir: &Path) -> Db {
        dbopen(
            &dir.join("db185"),
            OpenMode::WRCREAT,
            0o600,
            &OpenInfo::default(),
            &StoreTuning::default(),
        )
        .expect("dbopen")
    }

    #[test]
    fn test_put_get_borrowed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = open(dir.path());

        assert_eq!(db.put(b"k", b"v1", 0), RET_SUCCESS);
        assert_eq!(db.put(b"k", b"v2", R_NOOVERWRITE), RET_SPECIAL);
        assert_eq!(&*db.get(b"k", 0).unwrap(), b"v1");
        assert_eq!(db.get(b"missing", 0).err(), Some(RET_SPECIAL));
        Ok(())
    }

    #[test]
    fn test_seq_walks_all_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = open(dir.path());
        for key in [&b"a"[..], b"b", b"c"] {
            db.put(key, b"x", 0);
        }

        let mut seen = vec![db.seq(R_FIRST).unwrap().to_vec()];
        while let Ok(key) = db.seq(R_NEXT) {
            seen.push(key.to_vec());
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        Ok(())
    }

    #[test]
    fn test_del_missing_is_special() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = open(dir.path());
        assert_eq!(db.del(b"nope", 0), RET_SPECIAL);
        Ok(())
    }

    #[test]
    fn test_open_missing_reader_sets_errno() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = dbopen(
            &dir.path().join("absent"),
            OpenMode::READER,
            0o600,
            &OpenInfo::default(),
            &StoreTuning::default(),
        );
        assert!(db.is_none());
        assert_eq!(errno::errno(), errno::ENOENT);
        Ok(())
    }
}
