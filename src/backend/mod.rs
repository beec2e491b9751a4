//! Backend translation layer
//!
//! Each variant adapts one native library convention (see [`crate::native`])
//! to the uniform [`BackendDb`] contract: fetched buffers come back as owned
//! [`Datum`]s, misses are empty, and iteration hands out a [`Cursor`].

mod berkeley;
mod gdbm;
mod mdbm;
mod ndbm;

#[cfg(test)]
mod tests;

pub use berkeley::{V1Backend, V2Backend};
pub use gdbm::GdbmBackend;
pub use mdbm::MdbmBackend;
pub use ndbm::NdbmBackend;

use crate::config::LdbmConfig;
use crate::datum::Datum;
use crate::error::{Error, Result};
use crate::flags::{OpenMode, StoreFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which native library backs the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Berkeley DB 1.85 (`dbopen`)
    #[serde(alias = "db185")]
    BerkeleyV1,
    /// Berkeley DB 2.x and later (`db_open`), the only free-threaded variant
    #[serde(alias = "db2")]
    BerkeleyV2,
    Gdbm,
    Mdbm,
    Ndbm,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::BerkeleyV1,
        BackendKind::BerkeleyV2,
        BackendKind::Gdbm,
        BackendKind::Mdbm,
        BackendKind::Ndbm,
    ];

    /// Variant picked by the enabled cargo features.
    ///
    /// Precedence: Berkeley DB (2.x before 1.85), GDBM, MDBM, then NDBM.
    pub const fn compiled_default() -> BackendKind {
        if cfg!(feature = "berkeley2") {
            BackendKind::BerkeleyV2
        } else if cfg!(feature = "berkeley1") {
            BackendKind::BerkeleyV1
        } else if cfg!(feature = "gdbm") {
            BackendKind::Gdbm
        } else if cfg!(feature = "mdbm") {
            BackendKind::Mdbm
        } else {
            BackendKind::Ndbm
        }
    }

    /// Whether the native library tolerates concurrent callers
    pub const fn is_reentrant(self) -> bool {
        matches!(self, BackendKind::BerkeleyV2)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            BackendKind::BerkeleyV1 => "berkeley-v1",
            BackendKind::BerkeleyV2 => "berkeley-v2",
            BackendKind::Gdbm => "gdbm",
            BackendKind::Mdbm => "mdbm",
            BackendKind::Ndbm => "ndbm",
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::compiled_default()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "berkeley-v1" | "berkeley1" | "db185" => Ok(BackendKind::BerkeleyV1),
            "berkeley-v2" | "berkeley2" | "berkeley" | "db2" => Ok(BackendKind::BerkeleyV2),
            "gdbm" => Ok(BackendKind::Gdbm),
            "mdbm" => Ok(BackendKind::Mdbm),
            "ndbm" => Ok(BackendKind::Ndbm),
            other => Err(Error::InvalidArgument(format!("unknown backend '{}'", other))),
        }
    }
}

/// A native library ready to open stores
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn is_reentrant(&self) -> bool {
        self.kind().is_reentrant()
    }

    /// Open a store; `Err` carries the library's native error code
    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        permissions: u32,
        cache_size: usize,
    ) -> std::result::Result<Box<dyn BackendDb>, i32>;

    /// The file `open` would actually use for `path`, as an absolute path
    fn resolve(&self, path: &Path) -> PathBuf {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

/// One open store, already translated to the uniform conventions.
///
/// Callers are responsible for serializing access when the backend is not
/// reentrant.
pub trait BackendDb: Send + Sync {
    /// Release native resources. The handle must not be used afterwards.
    fn close(&self);

    fn sync(&self) -> i32;

    /// Owned copy of the value, empty on a miss or failure
    fn fetch(&self, key: &[u8]) -> Datum;

    /// `flags` never carries `SYNC`; the facade handles that itself.
    /// Returns 0 on success, anything else on failure.
    fn store(&self, key: &[u8], value: &[u8], flags: StoreFlags) -> i32;

    fn delete(&self, key: &[u8]) -> i32;

    fn first_key(&self) -> (Datum, Cursor);

    /// Takes ownership of `prev` and releases it
    fn next_key(&self, prev: Datum, cursor: &mut Cursor) -> Datum;

    fn last_error(&self) -> i32;

    /// Reclaim space held by deleted and replaced entries. Libraries with no
    /// such call have nothing to reclaim.
    fn reorganize(&self) -> i32 {
        0
    }
}

/// Stepping interface of a native cursor object
pub(crate) trait CursorOps: Send {
    /// Next key, or the native code that ended the walk
    fn step(&mut self) -> std::result::Result<Vec<u8>, i32>;
}

enum CursorState {
    Done,
    /// Position lives in the native handle or in the previous key
    Implicit,
    Explicit(Box<dyn CursorOps>),
}

/// Iteration position returned by `first_key`.
///
/// For libraries with cursor objects it owns the native cursor, which is
/// closed when the walk ends or the `Cursor` is dropped.
pub struct Cursor(CursorState);

impl Cursor {
    pub(crate) fn done() -> Self {
        Cursor(CursorState::Done)
    }

    pub(crate) fn implicit() -> Self {
        Cursor(CursorState::Implicit)
    }

    pub(crate) fn explicit(ops: Box<dyn CursorOps>) -> Self {
        Cursor(CursorState::Explicit(ops))
    }

    /// True once the walk has reached its end
    pub fn is_done(&self) -> bool {
        matches!(self.0, CursorState::Done)
    }

    pub(crate) fn finish(&mut self) {
        self.0 = CursorState::Done;
    }

    /// Step an explicit cursor. At the end, or on error, the native cursor is
    /// closed and `Err` carries its code. Non-explicit cursors yield `Ok(None)`.
    pub(crate) fn advance(&mut self) -> std::result::Result<Option<Vec<u8>>, i32> {
        let step = match &mut self.0 {
            CursorState::Explicit(ops) => ops.step(),
            _ => return Ok(None),
        };
        match step {
            Ok(key) => Ok(Some(key)),
            Err(code) => {
                self.finish();
                Err(code)
            }
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.0 {
            CursorState::Done => "done",
            CursorState::Implicit => "implicit",
            CursorState::Explicit(_) => "explicit",
        };
        write!(f, "Cursor({})", state)
    }
}

/// Build the backend for `kind`, setting up any library-wide environment
pub fn select(kind: BackendKind, config: &LdbmConfig) -> Result<Box<dyn Backend>> {
    let tuning = config.tuning();
    Ok(match kind {
        BackendKind::BerkeleyV1 => Box::new(V1Backend::new(tuning)),
        BackendKind::BerkeleyV2 => Box::new(V2Backend::new(config, tuning)?),
        BackendKind::Gdbm => Box::new(GdbmBackend::new(tuning)),
        BackendKind::Mdbm => Box::new(MdbmBackend::new(
            tuning,
            config.page_size,
            config.max_fetch_retries,
        )),
        BackendKind::Ndbm => Box::new(NdbmBackend::new(tuning)),
    })
}

#[cfg(test)]
mod kind_tests {
    use super::*;

    #[test]
    fn test_kind_parsing_and_display() -> Result<()> {
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>()?, kind);
        }
        assert_eq!("db185".parse::<BackendKind>()?, BackendKind::BerkeleyV1);
        assert_eq!("DB2".parse::<BackendKind>()?, BackendKind::BerkeleyV2);
        assert!("sqlite".parse::<BackendKind>().is_err());
        Ok(())
    }

    #[test]
    fn test_only_berkeley_v2_is_reentrant() {
        let reentrant: Vec<_> = BackendKind::ALL
            .into_iter()
            .filter(|k| k.is_reentrant())
            .collect();
        assert_eq!(reentrant, vec![BackendKind::BerkeleyV2]);
    }

    #[test]
    fn test_compiled_default_is_a_variant() {
        assert!(BackendKind::ALL.contains(&BackendKind::compiled_default()));
    }
}
