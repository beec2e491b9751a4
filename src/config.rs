//! Configuration
//!
//! Values come from an optional TOML file overlaid with `LDBM__*` environment
//! variables (`LDBM__BACKEND=gdbm`, `LDBM__SYNC_ON_DELETE=false`, ...).

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::native::StoreTuning;
use crate::storage::CompressionAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LdbmConfig {
    /// Native library behind the facade
    pub backend: BackendKind,
    /// Page size for libraries that take one (Berkeley DB 2.x, MDBM)
    pub page_size: usize,
    /// Cache hint in bytes used when `open` is given 0
    pub cache_size: usize,
    /// How many times an MDBM fetch may grow its buffer before giving up.
    /// The first growth, from the empty probe buffer, is always allowed.
    pub max_fetch_retries: u32,
    /// Flush after every delete
    pub sync_on_delete: bool,
    pub compression: CompressionAlgorithm,
    pub min_slot_size: usize,
    pub max_slot_size: usize,
    /// Berkeley DB 2.x environment home; relative store names resolve under it
    pub env_home: Option<PathBuf>,
    /// Prefix for Berkeley DB environment diagnostics
    pub errpfx: String,
}

impl Default for LdbmConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::compiled_default(),
            page_size: 4096,
            cache_size: 0,
            max_fetch_retries: 5,
            sync_on_delete: true,
            compression: CompressionAlgorithm::None,
            min_slot_size: 64,
            max_slot_size: 65536,
            env_home: None,
            errpfx: "==>".to_string(),
        }
    }
}

impl LdbmConfig {
    /// Load from `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("LDBM")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: LdbmConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let parsed: LdbmConfig = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be positive".into()));
        }
        if self.min_slot_size > self.max_slot_size {
            return Err(Error::Config(format!(
                "min_slot_size {} exceeds max_slot_size {}",
                self.min_slot_size, self.max_slot_size
            )));
        }
        Ok(())
    }

    /// Page-store tuning passed down to the native libraries
    pub fn tuning(&self) -> StoreTuning {
        StoreTuning {
            min_slot_size: self.min_slot_size,
            max_slot_size: self.max_slot_size,
            compression: self.compression,
            page_size: self.page_size,
            ..StoreTuning::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LdbmConfig::default();
        assert_eq!(config.max_fetch_retries, 5);
        assert!(config.sync_on_delete);
        assert_eq!(config.errpfx, "==>");
        assert_eq!(config.backend, BackendKind::compiled_default());
    }

    #[test]
    fn test_from_toml_partial() -> Result<()> {
        let config = LdbmConfig::from_toml_str(
            r#"
            backend = "mdbm"
            max_fetch_retries = 2
            compression = "zstd"
            "#,
        )?;
        assert_eq!(config.backend, BackendKind::Mdbm);
        assert_eq!(config.max_fetch_retries, 2);
        assert_eq!(config.compression, CompressionAlgorithm::Zstd);
        assert_eq!(config.page_size, 4096);
        Ok(())
    }

    #[test]
    fn test_backend_alias() -> Result<()> {
        let config = LdbmConfig::from_toml_str("backend = \"db185\"")?;
        assert_eq!(config.backend, BackendKind::BerkeleyV1);
        Ok(())
    }

    #[test]
    fn test_rejects_inverted_slot_sizes() {
        let err = LdbmConfig::from_toml_str("min_slot_size = 1024\nmax_slot_size = 64").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_tuning_carries_slot_sizes() {
        let config = LdbmConfig {
            min_slot_size: 128,
            max_slot_size: 1024,
            ..Default::default()
        };
        let tuning = config.tuning();
        assert_eq!((tuning.min_slot_size, tuning.max_slot_size), (128, 1024));
    }

    #[test]
    fn test_environment_overrides_use_double_underscore_prefix() -> Result<()> {
        std::env::set_var("LDBM__PAGE_SIZE", "8192");
        let loaded = LdbmConfig::load(None);
        std::env::remove_var("LDBM__PAGE_SIZE");

        assert_eq!(loaded?.page_size, 8192);
        Ok(())
    }
}
