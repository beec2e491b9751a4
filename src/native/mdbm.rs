//! MDBM interface
//!
//! Values are copied into a caller-supplied buffer; `fetch` reports the
//! stored size so a caller holding a short buffer can grow it and retry.
//! Keys must not start with a zero byte and must fit in one page.
//! `first`/`next` walk with a pointer kept inside the handle.

use super::errno::{self, set_errno};
use super::{store_options, StoreTuning};
use crate::flags::OpenMode;
use crate::storage::{SlabStore, WriteMode};
use parking_lot::Mutex;
use std::path::Path;
use tracing::debug;

pub const MDBM_INSERT: i32 = 0;
pub const MDBM_REPLACE: i32 = 1;

/// Default page size
pub const MDBM_PG_SZ: usize = 4096;

/// An open `MDBM *`
pub struct Mdbm {
    store: SlabStore,
    page_size: usize,
    iter: Mutex<Option<Vec<u8>>>,
}

/// Open `path` with the given page size (0 selects [`MDBM_PG_SZ`])
pub fn mdbm_open(
    path: &Path,
    flags: OpenMode,
    mode: u32,
    page_size: usize,
    tuning: &StoreTuning,
) -> Option<Mdbm> {
    let page_size = if page_size == 0 { MDBM_PG_SZ } else { page_size };
    let options = store_options(flags, mode, WriteMode::Buffered, tuning);
    match SlabStore::open(path, &options) {
        Ok(store) => Some(Mdbm {
            store,
            page_size,
            iter: Mutex::new(None),
        }),
        Err(e) => {
            debug!(path = ?path, error = %e, "mdbm_open failed");
            set_errno(e.errno());
            None
        }
    }
}

impl Mdbm {
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn check_key(&self, key: &[u8]) -> bool {
        if key.first().map_or(true, |&b| b == 0) || key.len() > self.page_size {
            set_errno(errno::EINVAL);
            return false;
        }
        true
    }

    /// Copy the value for `key` into `buf` and return its stored size.
    ///
    /// Nothing is copied when `buf` is shorter than the value; the caller
    /// sees a size larger than its buffer. Returns 0 on a miss or an error.
    pub fn fetch(&self, key: &[u8], buf: &mut [u8]) -> usize {
        if !self.check_key(key) {
            return 0;
        }
        match self.store.get(key) {
            Ok(Some(value)) => {
                if value.len() <= buf.len() {
                    buf[..value.len()].copy_from_slice(&value);
                }
                value.len()
            }
            Ok(None) => 0,
            Err(e) => {
                set_errno(e.errno());
                0
            }
        }
    }

    /// Returns 0 on success, 1 if `MDBM_INSERT` found the key, -1 on error
    pub fn store(&self, key: &[u8], val: &[u8], flags: i32) -> i32 {
        if !self.check_key(key) {
            return -1;
        }
        match self.store.put(key, val, flags == MDBM_REPLACE) {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(e) => {
                set_errno(e.errno());
                -1
            }
        }
    }

    pub fn delete(&self, key: &[u8]) -> i32 {
        if !self.check_key(key) {
            return -1;
        }
        match self.store.delete(key) {
            Ok(true) => 0,
            Ok(false) => {
                set_errno(errno::ENOENT);
                -1
            }
            Err(e) => {
                set_errno(e.errno());
                -1
            }
        }
    }

    /// Rewind and copy the first key into `buf`; returns its length, 0 at end
    pub fn first(&self, buf: &mut [u8]) -> usize {
        let mut iter = self.iter.lock();
        *iter = self.store.first_key();
        Self::emit(iter.as_deref(), buf)
    }

    /// Advance the handle's pointer; starts at the first key if never positioned
    pub fn next(&self, buf: &mut [u8]) -> usize {
        let mut iter = self.iter.lock();
        *iter = match iter.as_deref() {
            Some(current) => self.store.next_key(current),
            None => self.store.first_key(),
        };
        Self::emit(iter.as_deref(), buf)
    }

    fn emit(key: Option<&[u8]>, buf: &mut [u8]) -> usize {
        match key {
            Some(key) if key.len() <= buf.len() => {
                buf[..key.len()].copy_from_slice(key);
                key.len()
            }
            Some(_) => {
                set_errno(errno::ENOMEM);
                0
            }
            None => 0,
        }
    }

    pub fn sync(&self) -> i32 {
        match self.store.flush() {
            Ok(()) => 0,
            Err(e) => {
                set_errno(e.errno());
                -1
            }
        }
    }

    pub fn close(&self) {
        *self.iter.lock() = None;
        self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    fn open(dir: &Path) -> Mdbm {
        mdbm_open(&dir.join("m.db"), OpenMode::WRCREAT, 0o600, 0, &StoreTuning::default())
            .expect("mdbm_open")
    }

    #[test]
    fn test_fetch_reports_size_for_short_buffer() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = open(dir.path());
        assert_eq!(db.store(b"key", b"value", MDBM_INSERT), 0);

        let mut short = [0u8; 2];
        assert_eq!(db.fetch(b"key", &mut short), 5);
        assert_eq!(short, [0, 0]);

        let mut buf = vec![0u8; 5];
        assert_eq!(db.fetch(b"key", &mut buf), 5);
        assert_eq!(buf, b"value");
        Ok(())
    }

    #[test]
    fn test_rejects_zero_led_and_oversized_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = open(dir.path());
        assert_eq!(db.store(&[0u8], b"v", MDBM_REPLACE), -1);
        assert_eq!(errno::errno(), errno::EINVAL);

        let big = vec![b'k'; db.page_size() + 1];
        assert_eq!(db.store(&big, b"v", MDBM_REPLACE), -1);
        assert_eq!(db.store(b"ok", b"v", MDBM_INSERT), 0);
        assert_eq!(db.store(b"ok", b"w", MDBM_INSERT), 1);
        Ok(())
    }

    #[test]
    fn test_positionless_iteration() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = open(dir.path());
        db.store(b"a", b"1", MDBM_INSERT);
        db.store(b"b", b"2", MDBM_INSERT);

        let mut buf = vec![0u8; db.page_size()];
        // Never positioned: next behaves like first
        let n = db.next(&mut buf);
        assert_eq!(&buf[..n], b"a");
        let n = db.next(&mut buf);
        assert_eq!(&buf[..n], b"b");
        assert_eq!(db.next(&mut buf), 0);

        let n = db.first(&mut buf);
        assert_eq!(&buf[..n], b"a");
        Ok(())
    }
}
