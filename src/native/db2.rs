//! Berkeley DB 2.x interface
//!
//! Handles are free-threaded. `get` and cursor reads allocate the returned
//! buffers for the caller. Calls return `0`, a negative `DB_*` code, or a
//! positive system errno; diagnostics go through the environment's `errcall`.

use super::errno;
use super::{store_options, StoreTuning};
use crate::flags::OpenMode;
use crate::storage::{SlabStore, WriteMode};
use parking_lot::Mutex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const DB_KEYEXIST: i32 = -3;
pub const DB_NOTFOUND: i32 = -7;

/// `db_appinit` flags
pub const DB_CREATE: u32 = 0x0001;
pub const DB_THREAD: u32 = 0x0004;
pub const DB_INIT_MPOOL: u32 = 0x0100;

/// `put` flag
pub const DB_NOOVERWRITE: u32 = 0x0020;

/// `c_get` flags
pub const DB_FIRST: u32 = 7;
pub const DB_NEXT: u32 = 16;

const REGION_FILE: &str = "__db_mpool.share";

pub type ErrCall = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Shared environment: home directory, buffer pool flags and error reporting
#[derive(Default)]
pub struct DbEnv {
    home: Option<PathBuf>,
    flags: u32,
    errpfx: String,
    errcall: Option<ErrCall>,
}

impl fmt::Debug for DbEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbEnv")
            .field("home", &self.home)
            .field("flags", &self.flags)
            .field("errpfx", &self.errpfx)
            .finish()
    }
}

impl DbEnv {
    pub fn set_errpfx(&mut self, prefix: impl Into<String>) {
        self.errpfx = prefix.into();
    }

    pub fn set_errcall(&mut self, errcall: ErrCall) {
        self.errcall = Some(errcall);
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn is_threaded(&self) -> bool {
        self.flags & DB_THREAD != 0
    }

    fn err(&self, message: &str) {
        if let Some(errcall) = &self.errcall {
            errcall(&self.errpfx, message);
        }
    }

    /// Relative names live under the environment home
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.home {
            Some(home) if path.is_relative() => home.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Finish setting up `env` rooted at `home`. Returns a positive errno on failure.
pub fn db_appinit(home: Option<&Path>, mut env: DbEnv, flags: u32) -> Result<Arc<DbEnv>, i32> {
    env.flags = flags;
    if let Some(home) = home {
        if flags & DB_CREATE != 0 {
            if let Err(e) = fs::create_dir_all(home) {
                env.err(&format!("{}: {}", home.display(), e));
                return Err(e.raw_os_error().unwrap_or(errno::EIO));
            }
        }
        if !home.is_dir() {
            env.err(&format!("{}: not a directory", home.display()));
            return Err(errno::ENOENT);
        }
        if flags & DB_INIT_MPOOL != 0 {
            if let Err(e) = fs::write(home.join(REGION_FILE), flags.to_le_bytes()) {
                env.err(&format!("{}: {}", REGION_FILE, e));
                return Err(e.raw_os_error().unwrap_or(errno::EIO));
            }
        }
        env.home = Some(home.to_path_buf());
    }
    debug!(home = ?env.home, flags, "db_appinit");
    Ok(Arc::new(env))
}

/// Access method parameters for `db_open`
#[derive(Debug, Clone, Copy, Default)]
pub struct DbInfo {
    /// Underlying page size, 0 for the default
    pub pagesize: usize,
    /// Buffer pool size in bytes, 0 for the default
    pub cachesize: usize,
}

/// An open `DB *`
pub struct Db {
    store: Arc<SlabStore>,
    env: Arc<DbEnv>,
}

/// Open a database inside `env`. Relative paths resolve under the
/// environment home.
pub fn db_open(
    path: &Path,
    flags: OpenMode,
    mode: u32,
    env: &Arc<DbEnv>,
    info: &DbInfo,
    tuning: &StoreTuning,
) -> Result<Db, i32> {
    let mut tuning = tuning.clone();
    if info.pagesize > 0 {
        tuning.page_size = info.pagesize;
    }
    if info.cachesize > 0 {
        tuning.cache_capacity = tuning.cache_entries(info.cachesize);
    }

    let path = env.resolve(path);
    let options = store_options(flags, mode, WriteMode::Buffered, &tuning);
    match SlabStore::open(&path, &options) {
        Ok(store) => Ok(Db {
            store: Arc::new(store),
            env: Arc::clone(env),
        }),
        Err(e) => {
            env.err(&format!("{}: {}", path.display(), e));
            Err(e.errno())
        }
    }
}

impl Db {
    fn fail(&self, e: crate::error::Error) -> i32 {
        self.env.err(&e.to_string());
        e.errno()
    }

    pub fn get(&self, key: &[u8], _flags: u32) -> Result<Vec<u8>, i32> {
        match self.store.get(key) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(DB_NOTFOUND),
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn put(&self, key: &[u8], data: &[u8], flags: u32) -> i32 {
        let overwrite = flags & DB_NOOVERWRITE == 0;
        match self.store.put(key, data, overwrite) {
            Ok(true) => 0,
            Ok(false) => DB_KEYEXIST,
            Err(e) => self.fail(e),
        }
    }

    pub fn del(&self, key: &[u8], _flags: u32) -> i32 {
        match self.store.delete(key) {
            Ok(true) => 0,
            Ok(false) => DB_NOTFOUND,
            Err(e) => self.fail(e),
        }
    }

    pub fn sync(&self, _flags: u32) -> i32 {
        match self.store.flush() {
            Ok(()) => 0,
            Err(e) => self.fail(e),
        }
    }

    pub fn close(&self, flags: u32) -> i32 {
        self.sync(flags)
    }

    pub fn cursor(&self) -> Result<Dbc, i32> {
        Ok(Dbc {
            store: Arc::clone(&self.store),
            env: Arc::clone(&self.env),
            position: Mutex::new(None),
        })
    }
}

/// Cursor over a [`Db`]; it keeps its own position
pub struct Dbc {
    store: Arc<SlabStore>,
    env: Arc<DbEnv>,
    position: Mutex<Option<Vec<u8>>>,
}

impl Dbc {
    /// Step the cursor and return freshly allocated `(key, data)`.
    ///
    /// `DB_NEXT` on an unpositioned cursor behaves like `DB_FIRST`. Keys
    /// deleted between steps are skipped.
    pub fn c_get(&self, flags: u32) -> Result<(Vec<u8>, Vec<u8>), i32> {
        let mut position = self.position.lock();
        let mut candidate = match (flags, position.as_deref()) {
            (DB_FIRST, _) | (DB_NEXT, None) => self.store.first_key(),
            (DB_NEXT, Some(after)) => self.store.next_key(after),
            _ => return Err(errno::EINVAL),
        };

        while let Some(key) = candidate {
            match self.store.get(&key) {
                Ok(Some(data)) => {
                    *position = Some(key.clone());
                    return Ok((key, data));
                }
                Ok(None) => candidate = self.store.next_key(&key),
                Err(e) => {
                    self.env.err(&e.to_string());
                    return Err(e.errno());
                }
            }
        }
        Err(DB_NOTFOUND)
    }

    pub fn c_close(self) -> i32 {
        0
    }
}
