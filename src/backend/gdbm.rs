use super::{Backend, BackendDb, BackendKind, Cursor};
use crate::datum::Datum;
use crate::flags::{OpenMode, StoreFlags};
use crate::native::gdbm::{
    self, GdbmFile, GDBM_CACHESIZE, GDBM_FAST, GDBM_INSERT, GDBM_NEWDB, GDBM_READER,
    GDBM_REPLACE, GDBM_WRCREAT, GDBM_WRITER,
};
use crate::native::StoreTuning;
use std::path::Path;
use tracing::debug;

pub struct GdbmBackend {
    tuning: StoreTuning,
}

impl GdbmBackend {
    pub fn new(tuning: StoreTuning) -> Self {
        Self { tuning }
    }
}

fn read_write(mode: OpenMode) -> i32 {
    let base = if mode.contains(OpenMode::NEWDB) {
        GDBM_NEWDB
    } else if mode.contains(OpenMode::WRCREAT) {
        GDBM_WRCREAT
    } else if mode.is_writable() {
        GDBM_WRITER
    } else {
        GDBM_READER
    };
    base | GDBM_FAST
}

impl Backend for GdbmBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gdbm
    }

    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        permissions: u32,
        cache_size: usize,
    ) -> std::result::Result<Box<dyn BackendDb>, i32> {
        let db = gdbm::gdbm_open(path, 0, read_write(mode), permissions, &self.tuning)
            .ok_or_else(gdbm::gdbm_errno)?;

        // The hint is in bytes; gdbm counts its cache in blocks
        if cache_size > 0 {
            let blocks = cache_size / db.block_size();
            debug!(cache_size, blocks, "Setting gdbm cache size");
            db.setopt(GDBM_CACHESIZE, blocks);
        }
        Ok(Box::new(GdbmDb { db }))
    }
}

struct GdbmDb {
    db: GdbmFile,
}

impl BackendDb for GdbmDb {
    fn close(&self) {
        self.db.close();
    }

    fn sync(&self) -> i32 {
        self.db.sync();
        0
    }

    fn reorganize(&self) -> i32 {
        self.db.reorganize()
    }

    fn fetch(&self, key: &[u8]) -> Datum {
        self.db.fetch(key).map(Datum::from).unwrap_or_default()
    }

    fn store(&self, key: &[u8], value: &[u8], flags: StoreFlags) -> i32 {
        let flag = if flags.replace() { GDBM_REPLACE } else { GDBM_INSERT };
        self.db.store(key, value, flag)
    }

    fn delete(&self, key: &[u8]) -> i32 {
        self.db.delete(key)
    }

    fn first_key(&self) -> (Datum, Cursor) {
        match self.db.firstkey() {
            Some(key) => (Datum::from(key), Cursor::implicit()),
            None => (Datum::empty(), Cursor::done()),
        }
    }

    /// Position is carried by the previous key itself
    fn next_key(&self, prev: Datum, cursor: &mut Cursor) -> Datum {
        if cursor.is_done() {
            return Datum::empty();
        }
        let next = self.db.nextkey(&prev);
        drop(prev);
        match next {
            Some(key) => Datum::from(key),
            None => {
                cursor.finish();
                Datum::empty()
            }
        }
    }

    fn last_error(&self) -> i32 {
        gdbm::gdbm_errno()
    }
}
