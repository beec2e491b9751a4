use super::{Backend, BackendDb, BackendKind, Cursor};
use crate::datum::Datum;
use crate::flags::{OpenMode, StoreFlags};
use crate::native::errno;
use crate::native::ndbm::{self, Dbm, DBM_INSERT, DBM_REPLACE};
use crate::native::StoreTuning;
use std::path::Path;

pub struct NdbmBackend {
    tuning: StoreTuning,
}

impl NdbmBackend {
    pub fn new(tuning: StoreTuning) -> Self {
        Self { tuning }
    }
}

impl Backend for NdbmBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ndbm
    }

    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        permissions: u32,
        _cache_size: usize,
    ) -> std::result::Result<Box<dyn BackendDb>, i32> {
        ndbm::dbm_open(path, mode, permissions, &self.tuning)
            .map(|db| Box::new(NdbmDb { db }) as Box<dyn BackendDb>)
            .ok_or_else(errno::errno)
    }
}

struct NdbmDb {
    db: Dbm,
}

impl BackendDb for NdbmDb {
    fn close(&self) {
        self.db.dbm_close();
    }

    /// Writes are never buffered
    fn sync(&self) -> i32 {
        0
    }

    fn fetch(&self, key: &[u8]) -> Datum {
        self.db
            .dbm_fetch(key)
            .map(|value| Datum::dup(&value))
            .unwrap_or_default()
    }

    fn store(&self, key: &[u8], value: &[u8], flags: StoreFlags) -> i32 {
        let flag = if flags.replace() { DBM_REPLACE } else { DBM_INSERT };
        self.db.dbm_store(key, value, flag)
    }

    fn delete(&self, key: &[u8]) -> i32 {
        self.db.dbm_delete(key)
    }

    fn first_key(&self) -> (Datum, Cursor) {
        match self.db.dbm_firstkey() {
            Some(key) => (Datum::dup(&key), Cursor::implicit()),
            None => (Datum::empty(), Cursor::done()),
        }
    }

    fn next_key(&self, prev: Datum, cursor: &mut Cursor) -> Datum {
        drop(prev);
        if cursor.is_done() {
            return Datum::empty();
        }
        match self.db.dbm_nextkey() {
            Some(key) => Datum::dup(&key),
            None => {
                cursor.finish();
                Datum::empty()
            }
        }
    }

    fn last_error(&self) -> i32 {
        self.db.dbm_error()
    }
}
