//! NDBM interface
//!
//! Every write goes straight to disk, so there is no sync call. Fetched
//! values and keys are handle-owned and valid until the next call. Errors
//! raise a per-handle flag read with `dbm_error`.

use super::errno::{self, set_errno};
use super::{store_options, StoreTuning};
use crate::flags::OpenMode;
use crate::storage::{SlabStore, WriteMode};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::path::Path;
use tracing::debug;

pub const DBM_INSERT: i32 = 0;
pub const DBM_REPLACE: i32 = 1;

#[derive(Default)]
struct DbmState {
    key: Vec<u8>,
    value: Vec<u8>,
    position: Option<Vec<u8>>,
    error: bool,
}

/// An open `DBM *`
pub struct Dbm {
    store: SlabStore,
    state: Mutex<DbmState>,
}

pub fn dbm_open(path: &Path, flags: OpenMode, mode: u32, tuning: &StoreTuning) -> Option<Dbm> {
    let options = store_options(flags, mode, WriteMode::WriteThrough, tuning);
    match SlabStore::open(path, &options) {
        Ok(store) => Some(Dbm {
            store,
            state: Mutex::new(DbmState::default()),
        }),
        Err(e) => {
            debug!(path = ?path, error = %e, "dbm_open failed");
            set_errno(e.errno());
            None
        }
    }
}

impl Dbm {
    pub fn dbm_fetch(&self, key: &[u8]) -> Option<MappedMutexGuard<'_, [u8]>> {
        let mut state = self.state.lock();
        match self.store.get(key) {
            Ok(Some(value)) => {
                state.value = value;
                Some(MutexGuard::map(state, |s| s.value.as_mut_slice()))
            }
            Ok(None) => None,
            Err(e) => {
                state.error = true;
                set_errno(e.errno());
                None
            }
        }
    }

    /// Returns 0 on success, 1 if `DBM_INSERT` found the key, -1 on error
    pub fn dbm_store(&self, key: &[u8], content: &[u8], flags: i32) -> i32 {
        match self.store.put(key, content, flags == DBM_REPLACE) {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(e) => {
                self.state.lock().error = true;
                set_errno(e.errno());
                -1
            }
        }
    }

    pub fn dbm_delete(&self, key: &[u8]) -> i32 {
        match self.store.delete(key) {
            Ok(true) => 0,
            Ok(false) => {
                set_errno(errno::ENOENT);
                -1
            }
            Err(e) => {
                self.state.lock().error = true;
                set_errno(e.errno());
                -1
            }
        }
    }

    pub fn dbm_firstkey(&self) -> Option<MappedMutexGuard<'_, [u8]>> {
        let state = self.state.lock();
        let first = self.store.first_key();
        Self::emit_key(state, first)
    }

    /// Continue from the handle's position
    pub fn dbm_nextkey(&self) -> Option<MappedMutexGuard<'_, [u8]>> {
        let state = self.state.lock();
        let next = match state.position.as_deref() {
            Some(current) => self.store.next_key(current),
            None => None,
        };
        Self::emit_key(state, next)
    }

    fn emit_key(
        mut state: MutexGuard<'_, DbmState>,
        key: Option<Vec<u8>>,
    ) -> Option<MappedMutexGuard<'_, [u8]>> {
        match key {
            Some(key) => {
                state.position = Some(key.clone());
                state.key = key;
                Some(MutexGuard::map(state, |s| s.key.as_mut_slice()))
            }
            None => {
                state.position = None;
                None
            }
        }
    }

    /// Nonzero once an I/O error has been seen on this handle
    pub fn dbm_error(&self) -> i32 {
        i32::from(self.state.lock().error)
    }

    pub fn dbm_clearerr(&self) {
        self.state.lock().error = false;
    }

    pub fn dbm_close(&self) {
        if let Err(e) = self.store.flush() {
            self.state.lock().error = true;
            set_errno(e.errno());
        }
    }
}
