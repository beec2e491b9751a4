//! Berkeley DB translations (1.85 and 2.x)

use super::{Backend, BackendDb, BackendKind, Cursor, CursorOps};
use crate::config::LdbmConfig;
use crate::datum::Datum;
use crate::error::{Error, Result};
use crate::flags::{OpenMode, StoreFlags};
use crate::native::db185::{self, OpenInfo, R_FIRST, R_NEXT, R_NOOVERWRITE};
use crate::native::db2::{
    self, DbEnv, DbInfo, Dbc, DB_CREATE, DB_INIT_MPOOL, DB_NEXT, DB_NOOVERWRITE, DB_NOTFOUND,
    DB_THREAD,
};
use crate::native::errno;
use crate::native::StoreTuning;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Berkeley DB 1.85: borrowed buffers are duplicated before returning
pub struct V1Backend {
    tuning: StoreTuning,
}

impl V1Backend {
    pub fn new(tuning: StoreTuning) -> Self {
        Self { tuning }
    }
}

impl Backend for V1Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::BerkeleyV1
    }

    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        permissions: u32,
        cache_size: usize,
    ) -> std::result::Result<Box<dyn BackendDb>, i32> {
        let info = OpenInfo {
            cachesize: cache_size,
        };
        match db185::dbopen(path, mode, permissions, &info, &self.tuning) {
            Some(db) => Ok(Box::new(V1Db { db })),
            None => Err(errno::errno()),
        }
    }
}

struct V1Db {
    db: db185::Db,
}

impl BackendDb for V1Db {
    fn close(&self) {
        self.db.close();
    }

    fn sync(&self) -> i32 {
        self.db.sync(0)
    }

    fn fetch(&self, key: &[u8]) -> Datum {
        match self.db.get(key, 0) {
            Ok(data) => Datum::dup(&data),
            Err(_) => Datum::empty(),
        }
    }

    fn store(&self, key: &[u8], value: &[u8], flags: StoreFlags) -> i32 {
        let flags = if flags.replace() { 0 } else { R_NOOVERWRITE };
        self.db.put(key, value, flags)
    }

    fn delete(&self, key: &[u8]) -> i32 {
        self.db.del(key, 0)
    }

    fn first_key(&self) -> (Datum, Cursor) {
        match self.db.seq(R_FIRST) {
            Ok(key) => (Datum::dup(&key), Cursor::implicit()),
            Err(_) => (Datum::empty(), Cursor::done()),
        }
    }

    fn next_key(&self, prev: Datum, cursor: &mut Cursor) -> Datum {
        drop(prev);
        if cursor.is_done() {
            return Datum::empty();
        }
        match self.db.seq(R_NEXT) {
            Ok(key) => Datum::dup(&key),
            Err(_) => {
                cursor.finish();
                Datum::empty()
            }
        }
    }

    fn last_error(&self) -> i32 {
        errno::errno()
    }
}

/// Berkeley DB 2.x: one shared environment, allocated buffers, real cursors
pub struct V2Backend {
    env: Arc<DbEnv>,
    tuning: StoreTuning,
    page_size: usize,
}

impl V2Backend {
    /// Set up the shared environment. Failure here is unrecoverable for the
    /// process-wide initializer.
    pub fn new(config: &LdbmConfig, tuning: StoreTuning) -> Result<Self> {
        let mut env = DbEnv::default();
        env.set_errpfx(config.errpfx.clone());
        env.set_errcall(Box::new(|prefix, message| {
            info!(target: "ldbm::db2", "{} {}", prefix, message);
        }));

        let flags = DB_CREATE | DB_THREAD | DB_INIT_MPOOL;
        let env = db2::db_appinit(config.env_home.as_deref(), env, flags).map_err(|rc| {
            Error::Environment(format!("db_appinit failed with code {}", rc))
        })?;
        info!(home = ?env.home(), "Berkeley DB environment ready");

        Ok(Self {
            env,
            tuning,
            page_size: config.page_size,
        })
    }
}

impl Backend for V2Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::BerkeleyV2
    }

    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        permissions: u32,
        cache_size: usize,
    ) -> std::result::Result<Box<dyn BackendDb>, i32> {
        let info = DbInfo {
            pagesize: self.page_size,
            cachesize: cache_size,
        };
        let db = db2::db_open(path, mode, permissions, &self.env, &info, &self.tuning)?;
        Ok(Box::new(V2Db {
            db,
            last_rc: AtomicI32::new(0),
        }))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let resolved = self.env.resolve(path);
        std::path::absolute(&resolved).unwrap_or(resolved)
    }
}

struct V2Db {
    db: db2::Db,
    last_rc: AtomicI32,
}

impl V2Db {
    /// Record a native return code and flip it to the facade's sign
    fn record(&self, rc: i32) -> i32 {
        if rc != 0 {
            self.last_rc.store(rc, Ordering::Relaxed);
        }
        -rc
    }

    fn step(&self, cursor: &mut Cursor) -> Datum {
        match cursor.advance() {
            Ok(Some(key)) => Datum::from(key),
            Ok(None) | Err(DB_NOTFOUND) => Datum::empty(),
            Err(rc) => {
                self.record(rc);
                Datum::empty()
            }
        }
    }
}

impl BackendDb for V2Db {
    fn close(&self) {
        self.db.close(0);
    }

    fn sync(&self) -> i32 {
        let rc = self.db.sync(0);
        self.record(rc)
    }

    fn fetch(&self, key: &[u8]) -> Datum {
        match self.db.get(key, 0) {
            Ok(data) => Datum::from(data),
            Err(rc) => {
                self.record(rc);
                Datum::empty()
            }
        }
    }

    fn store(&self, key: &[u8], value: &[u8], flags: StoreFlags) -> i32 {
        let flags = if flags.replace() { 0 } else { DB_NOOVERWRITE };
        let rc = self.db.put(key, value, flags);
        self.record(rc)
    }

    fn delete(&self, key: &[u8]) -> i32 {
        let rc = self.db.del(key, 0);
        self.record(rc)
    }

    fn first_key(&self) -> (Datum, Cursor) {
        let dbc = match self.db.cursor() {
            Ok(dbc) => dbc,
            Err(rc) => {
                self.record(rc);
                return (Datum::empty(), Cursor::done());
            }
        };
        let mut cursor = Cursor::explicit(Box::new(V2Cursor(Some(dbc))));
        let key = self.step(&mut cursor);
        (key, cursor)
    }

    fn next_key(&self, prev: Datum, cursor: &mut Cursor) -> Datum {
        drop(prev);
        self.step(cursor)
    }

    fn last_error(&self) -> i32 {
        self.last_rc.load(Ordering::Relaxed)
    }
}

struct V2Cursor(Option<Dbc>);

impl CursorOps for V2Cursor {
    fn step(&mut self) -> std::result::Result<Vec<u8>, i32> {
        match &self.0 {
            Some(dbc) => dbc.c_get(DB_NEXT).map(|(key, _data)| key),
            None => Err(DB_NOTFOUND),
        }
    }
}

impl Drop for V2Cursor {
    fn drop(&mut self) {
        if let Some(dbc) = self.0.take() {
            debug!("Closing cursor");
            dbc.c_close();
        }
    }
}
