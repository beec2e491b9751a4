//! The uniform store handle
//!
//! Every call enters the environment's critical section for its full
//! duration. Results are owned copies; nothing returned aliases backend
//! memory.

use crate::backend::{BackendDb, BackendKind};
use crate::datum::Datum;
use crate::env::LdbmEnv;
use crate::error::Error;
use crate::flags::StoreFlags;
use crate::native::errno;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub use crate::backend::Cursor;

/// A failed facade call, carrying the backend's native code
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ldbm operation failed (code {code})")]
pub struct Failure {
    /// Never 0
    pub code: i32,
}

impl Failure {
    /// Wrap a native return code; 0 becomes -1
    pub fn new(code: i32) -> Self {
        Failure {
            code: if code == 0 { -1 } else { code },
        }
    }
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Failure::new(e.errno())
    }
}

/// Outcome of a mutating call
pub type Status = Result<(), Failure>;

fn status(rc: i32) -> Status {
    if rc == 0 {
        Ok(())
    } else {
        Err(Failure::new(rc))
    }
}

/// One open store. Dropping it closes the store.
pub struct Ldbm {
    env: Arc<LdbmEnv>,
    db: Box<dyn BackendDb>,
    path: PathBuf,
    /// Key in the environment's open table
    key: PathBuf,
}

impl Ldbm {
    pub(crate) fn new(env: Arc<LdbmEnv>, db: Box<dyn BackendDb>, path: PathBuf, key: PathBuf) -> Self {
        Self { env, db, path, key }
    }

    pub fn close(self) {
        drop(self);
    }

    pub fn sync(&self) -> Status {
        let _section = self.env.enter();
        status(self.db.sync())
    }

    /// Owned copy of the value for `key`; empty on a miss or failure
    pub fn fetch(&self, key: impl AsRef<[u8]>) -> Datum {
        let key = key.as_ref();
        let _section = self.env.enter();
        let value = self.db.fetch(key);
        debug!(key_len = key.len(), value_len = value.len(), "fetch");
        value
    }

    /// Without `REPLACE` an existing key is left untouched and the call fails.
    /// With `SYNC` the store is flushed after the write. Empty keys are
    /// refused with `EINVAL`.
    pub fn store(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>, flags: StoreFlags) -> Status {
        let (key, value) = (key.as_ref(), value.as_ref());
        // An empty key would read as the end of every walk
        if key.is_empty() {
            debug!("store rejected an empty key");
            return Err(Failure::new(errno::EINVAL));
        }
        let _section = self.env.enter();
        let rc = self.db.store(key, value, flags.without_sync());
        if flags.sync() {
            self.db.sync();
        }
        debug!(key_len = key.len(), value_len = value.len(), ?flags, rc, "store");
        status(rc)
    }

    /// Remove `key`; fails if it was absent. Followed by a sync unless the
    /// environment's `sync_on_delete` is off.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Status {
        let key = key.as_ref();
        let _section = self.env.enter();
        let rc = self.db.delete(key);
        if self.env.config().sync_on_delete {
            self.db.sync();
        }
        debug!(key_len = key.len(), rc, "delete");
        status(rc)
    }

    /// Drop space held by deleted and replaced entries (GDBM `reorganize`;
    /// a no-op for the other libraries)
    pub fn reorganize(&self) -> Status {
        let _section = self.env.enter();
        let rc = self.db.reorganize();
        info!(path = ?self.path, rc, "reorganize");
        status(rc)
    }

    /// Start a walk over all keys; an empty key means the store is empty
    pub fn first_key(&self) -> (Datum, Cursor) {
        let _section = self.env.enter();
        self.db.first_key()
    }

    /// Continue a walk. `prev` is consumed; an empty result ends the walk.
    ///
    /// Order is unspecified and mutating the store mid-walk may skip or
    /// repeat keys, depending on the backend.
    pub fn next_key(&self, prev: Datum, cursor: &mut Cursor) -> Datum {
        let _section = self.env.enter();
        self.db.next_key(prev, cursor)
    }

    /// Iterator over all keys, built on `first_key`/`next_key`
    pub fn keys(&self) -> Keys<'_> {
        Keys {
            handle: self,
            cursor: None,
            prev: Datum::empty(),
        }
    }

    /// Most recent native error code; only meaningful right after a failed
    /// call on the same thread
    pub fn last_error(&self) -> i32 {
        let _section = self.env.enter();
        self.db.last_error()
    }

    pub fn kind(&self) -> BackendKind {
        self.env.kind()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Ldbm {
    fn drop(&mut self) {
        let _section = self.env.enter();
        self.db.close();
        self.env.release(&self.key);
        info!(path = ?self.path, "Closed store");
    }
}

impl fmt::Debug for Ldbm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ldbm")
            .field("backend", &self.kind())
            .field("path", &self.path)
            .finish()
    }
}

/// Iterator returned by [`Ldbm::keys`]
pub struct Keys<'a> {
    handle: &'a Ldbm,
    cursor: Option<Cursor>,
    prev: Datum,
}

impl Iterator for Keys<'_> {
    type Item = Datum;

    fn next(&mut self) -> Option<Datum> {
        let key = if let Some(cursor) = self.cursor.as_mut() {
            if cursor.is_done() {
                return None;
            }
            self.handle.next_key(std::mem::take(&mut self.prev), cursor)
        } else {
            let (key, cursor) = self.handle.first_key();
            self.cursor = Some(cursor);
            key
        };

        if key.is_empty() {
            if let Some(cursor) = self.cursor.as_mut() {
                cursor.finish();
            }
            return None;
        }
        self.prev = key.clone();
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_never_zero() {
        assert_eq!(Failure::new(0).code, -1);
        assert_eq!(Failure::new(3).code, 3);
        assert_eq!(status(0), Ok(()));
        assert_eq!(status(1), Err(Failure { code: 1 }));
    }

    #[test]
    fn test_failure_from_error() {
        let failure = Failure::from(Error::Busy("x".into()));
        assert_eq!(failure.code, crate::native::errno::EBUSY);
    }
}
