// LDBM - Rust Implementation
// One key/value store facade over interchangeable dbm-style backends

//! # Overview
//!
//! ```text
//! Ldbm (facade handle)
//!   └─→ LdbmEnv (backend selection, big lock, open-handle table)
//!        └─→ Backend translation (berkeley v1/v2, gdbm, mdbm, ndbm)
//!             └─→ Native library convention (borrowed/allocated buffers, cursors, errno)
//!                  └─→ SlabStore (slot files + metadata log + LRU cache)
//! ```
//!
//! Callers only ever see [`Ldbm`]: fetched buffers are owned copies, misses are
//! empty [`Datum`]s, and mutating calls return a [`Status`].

#![warn(rust_2018_idioms)]

pub mod backend;
pub mod config;
pub mod datum;
pub mod env;
pub mod facade;
pub mod flags;
pub mod native;
pub mod storage;

// Re-exports for convenience
pub use backend::BackendKind;
pub use config::LdbmConfig;
pub use datum::Datum;
pub use env::{initialize, LdbmEnv};
pub use facade::{Cursor, Failure, Keys, Ldbm, Status};
pub use flags::{OpenMode, StoreFlags};

/// LDBM error types
pub mod error {
    use crate::native::errno;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Storage error: {0}")]
        Storage(String),

        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Not found: {0}")]
        NotFound(String),

        #[error("Already exists: {0}")]
        AlreadyExists(String),

        #[error("Read-only: {0}")]
        ReadOnly(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Busy: {0}")]
        Busy(String),

        #[error("Serialization error: {0}")]
        SerializationError(String),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Environment error: {0}")]
        Environment(String),
    }

    impl Error {
        /// POSIX-style code reported through the native error channels.
        pub fn errno(&self) -> i32 {
            match self {
                Error::Io(e) => e.raw_os_error().unwrap_or(errno::EIO),
                Error::NotFound(_) => errno::ENOENT,
                Error::AlreadyExists(_) => errno::EEXIST,
                Error::ReadOnly(_) => errno::EACCES,
                Error::InvalidArgument(_) | Error::Config(_) => errno::EINVAL,
                Error::Busy(_) => errno::EBUSY,
                Error::Storage(_)
                | Error::SerializationError(_)
                | Error::Environment(_) => errno::EIO,
            }
        }
    }

    impl From<::config::ConfigError> for Error {
        fn from(e: ::config::ConfigError) -> Self {
            Error::Config(e.to_string())
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;
    use super::native::errno;

    #[test]
    fn test_error_errno_mapping() {
        assert_eq!(Error::NotFound("x".into()).errno(), errno::ENOENT);
        assert_eq!(Error::ReadOnly("x".into()).errno(), errno::EACCES);
        assert_eq!(Error::Busy("x".into()).errno(), errno::EBUSY);
        assert_eq!(Error::Storage("x".into()).errno(), errno::EIO);

        let io = std::io::Error::from_raw_os_error(errno::ENOSPC);
        assert_eq!(Error::Io(io).errno(), errno::ENOSPC);
    }
}
