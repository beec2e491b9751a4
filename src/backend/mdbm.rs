//! MDBM translation
//!
//! MDBM refuses keys that begin with a zero byte, so every key handed in is
//! prefixed with [`NO_NULL_KEY`] and every key handed back has it stripped.

use super::{Backend, BackendDb, BackendKind, Cursor};
use crate::datum::Datum;
use crate::flags::{OpenMode, StoreFlags};
use crate::native::errno;
use crate::native::mdbm::{self, Mdbm, MDBM_INSERT, MDBM_REPLACE};
use crate::native::StoreTuning;
use std::path::Path;
use tracing::{debug, warn};

const NO_NULL_KEY: u8 = b'l';

pub struct MdbmBackend {
    tuning: StoreTuning,
    page_size: usize,
    max_fetch_retries: u32,
}

impl MdbmBackend {
    pub fn new(tuning: StoreTuning, page_size: usize, max_fetch_retries: u32) -> Self {
        Self {
            tuning,
            page_size,
            max_fetch_retries,
        }
    }
}

impl Backend for MdbmBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mdbm
    }

    /// The cache hint is ignored; MDBM sizes itself by page
    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        permissions: u32,
        _cache_size: usize,
    ) -> std::result::Result<Box<dyn BackendDb>, i32> {
        match mdbm::mdbm_open(path, mode, permissions, self.page_size, &self.tuning) {
            Some(db) => Ok(Box::new(MdbmDb {
                db,
                max_fetch_retries: self.max_fetch_retries,
            })),
            None => Err(errno::errno()),
        }
    }
}

fn internal_key(key: &[u8]) -> Vec<u8> {
    let mut internal = Vec::with_capacity(key.len() + 1);
    internal.push(NO_NULL_KEY);
    internal.extend_from_slice(key);
    internal
}

struct MdbmDb {
    db: Mdbm,
    max_fetch_retries: u32,
}

impl MdbmDb {
    fn external_key(&self, buf: &[u8], len: usize) -> Datum {
        match len {
            0 => Datum::empty(),
            n => Datum::dup(&buf[1..n]),
        }
    }
}

impl BackendDb for MdbmDb {
    fn close(&self) {
        self.db.close();
    }

    fn sync(&self) -> i32 {
        self.db.sync()
    }

    /// Grow the buffer to the size MDBM reports and retry, up to the
    /// configured number of reallocations (at least one)
    fn fetch(&self, key: &[u8]) -> Datum {
        let key = internal_key(key);
        let ceiling = self.max_fetch_retries.max(1);
        let mut buf: Vec<u8> = Vec::new();
        let mut retries = 0;

        loop {
            let size = self.db.fetch(&key, &mut buf);
            if size == 0 {
                return Datum::empty();
            }
            if size <= buf.len() {
                buf.truncate(size);
                return Datum::from(buf);
            }
            if retries >= ceiling {
                warn!(size, retries, "Giving up on mdbm fetch");
                return Datum::empty();
            }
            retries += 1;

            buf.clear();
            if buf.try_reserve_exact(size).is_err() {
                warn!(size, "Cannot allocate mdbm fetch buffer");
                errno::set_errno(errno::ENOMEM);
                return Datum::empty();
            }
            buf.resize(size, 0);
            debug!(size, retries, "Retrying mdbm fetch with a larger buffer");
        }
    }

    fn store(&self, key: &[u8], value: &[u8], flags: StoreFlags) -> i32 {
        let flag = if flags.replace() { MDBM_REPLACE } else { MDBM_INSERT };
        self.db.store(&internal_key(key), value, flag)
    }

    fn delete(&self, key: &[u8]) -> i32 {
        self.db.delete(&internal_key(key))
    }

    fn first_key(&self) -> (Datum, Cursor) {
        let mut buf = vec![0u8; self.db.page_size()];
        let len = self.db.first(&mut buf);
        if len == 0 {
            return (Datum::empty(), Cursor::done());
        }
        (self.external_key(&buf, len), Cursor::implicit())
    }

    /// MDBM iteration is positionless: `prev` is only released, the
    /// handle's own pointer decides what comes next
    fn next_key(&self, prev: Datum, cursor: &mut Cursor) -> Datum {
        drop(prev);
        if cursor.is_done() {
            return Datum::empty();
        }
        let mut buf = vec![0u8; self.db.page_size()];
        let len = self.db.next(&mut buf);
        if len == 0 {
            cursor.finish();
        }
        self.external_key(&buf, len)
    }

    fn last_error(&self) -> i32 {
        errno::errno()
    }
}
