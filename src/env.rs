//! Process-wide ldbm environment
//!
//! An [`LdbmEnv`] owns the selected backend, the big lock that serializes
//! calls into non-reentrant libraries, and the table of open store paths.
//! Build one explicitly with [`LdbmEnv::new`] or use [`initialize`] for the
//! single process-lifetime instance.

use crate::backend::{self, Backend, BackendKind};
use crate::config::LdbmConfig;
use crate::error::Result;
use crate::facade::{Failure, Ldbm};
use crate::flags::OpenMode;
use crate::native::errno;
use dashmap::DashSet;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, instrument};

pub struct LdbmEnv {
    backend: Box<dyn Backend>,
    /// `None` for reentrant backends
    big_lock: Option<Mutex<()>>,
    open_paths: DashSet<PathBuf>,
    config: LdbmConfig,
}

/// Held for the duration of one facade call
pub(crate) type Section<'a> = Option<MutexGuard<'a, ()>>;

impl LdbmEnv {
    /// Select the configured backend and set up its environment.
    ///
    /// Fails with [`Error::Environment`](crate::error::Error::Environment) when the backend's shared environment
    /// cannot be created.
    pub fn new(config: LdbmConfig) -> Result<Self> {
        config.validate()?;
        let backend = backend::select(config.backend, &config)?;
        let reentrant = backend.is_reentrant();
        info!(backend = %backend.kind(), reentrant, "Initialized ldbm environment");

        Ok(Self {
            big_lock: (!reentrant).then(|| Mutex::new(())),
            backend,
            open_paths: DashSet::new(),
            config,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn config(&self) -> &LdbmConfig {
        &self.config
    }

    /// Number of stores currently open through this environment
    pub fn open_count(&self) -> usize {
        self.open_paths.len()
    }

    /// Enter the critical section (a no-op for reentrant backends)
    pub(crate) fn enter(&self) -> Section<'_> {
        self.big_lock.as_ref().map(|lock| lock.lock())
    }

    /// Open or create the store at `name`.
    ///
    /// A `cache_size` of 0 uses the configured default. Opening a path that
    /// is already open in this environment fails with `EBUSY`.
    pub fn open(
        self: &Arc<Self>,
        name: impl AsRef<Path>,
        mode: OpenMode,
        permissions: u32,
        cache_size: usize,
    ) -> std::result::Result<Ldbm, Failure> {
        self.open_path(name.as_ref(), mode, permissions, cache_size)
    }

    #[instrument(skip(self), fields(backend = %self.kind()))]
    fn open_path(
        self: &Arc<Self>,
        path: &Path,
        mode: OpenMode,
        permissions: u32,
        cache_size: usize,
    ) -> std::result::Result<Ldbm, Failure> {
        let _section = self.enter();

        let key = self.backend.resolve(path);
        if !self.open_paths.insert(key.clone()) {
            debug!("Store already open");
            return Err(Failure::new(errno::EBUSY));
        }

        let cache_size = if cache_size == 0 {
            self.config.cache_size
        } else {
            cache_size
        };
        match self.backend.open(path, mode, permissions, cache_size) {
            Ok(db) => {
                info!("Opened store");
                Ok(Ldbm::new(Arc::clone(self), db, path.to_path_buf(), key))
            }
            Err(code) => {
                self.open_paths.remove(&key);
                debug!(code, "Open failed");
                Err(Failure::new(code))
            }
        }
    }

    /// Forget a closed store; called with the section held
    pub(crate) fn release(&self, key: &Path) {
        self.open_paths.remove(key);
    }
}

impl fmt::Debug for LdbmEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdbmEnv")
            .field("backend", &self.kind())
            .field("locked", &self.big_lock.is_some())
            .field("open", &self.open_paths.len())
            .finish()
    }
}

static GLOBAL_ENV: OnceLock<Arc<LdbmEnv>> = OnceLock::new();

/// Set up the process-wide environment on first call and return it.
///
/// Later calls return the same environment and ignore `config`. If the
/// backend environment cannot be created the process exits with status 1.
pub fn initialize(config: LdbmConfig) -> Arc<LdbmEnv> {
    Arc::clone(GLOBAL_ENV.get_or_init(|| match LdbmEnv::new(config) {
        Ok(env) => Arc::new(env),
        Err(e) => {
            error!(error = %e, "Cannot initialize ldbm environment");
            std::process::exit(1);
        }
    }))
}

/// The process-wide environment, if [`initialize`] has run
pub fn global() -> Option<Arc<LdbmEnv>> {
    GLOBAL_ENV.get().cloned()
}
