//! Record compression for the page store

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Compression applied to every stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    None,
    Zstd,
}

const ZSTD_LEVEL: i32 = 3;

pub fn compress(data: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::None => Ok(data.to_vec()),
        CompressionAlgorithm::Zstd => {
            let mut encoder = zstd::Encoder::new(Vec::new(), ZSTD_LEVEL)
                .map_err(|e| Error::Storage(format!("Failed to create zstd encoder: {}", e)))?;
            encoder
                .write_all(data)
                .map_err(|e| Error::Storage(format!("Failed to compress: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| Error::Storage(format!("Failed to finish compression: {}", e)))
        }
    }
}

pub fn decompress(data: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::None => Ok(data.to_vec()),
        CompressionAlgorithm::Zstd => zstd::decode_all(data)
            .map_err(|e| Error::Storage(format!("Failed to decompress: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_none_is_identity() -> Result<()> {
        let data = b"Hello, World!";
        assert_eq!(compress(data, CompressionAlgorithm::None)?, data);
        Ok(())
    }

    #[test]
    fn test_compression_zstd_shrinks_repetitive_data() -> Result<()> {
        let data = b"cn=admin,dc=example,dc=com ".repeat(20);
        let compressed = compress(&data, CompressionAlgorithm::Zstd)?;
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed, CompressionAlgorithm::Zstd)?, data);
        Ok(())
    }

    #[test]
    fn test_zstd_rejects_garbage() {
        assert!(decompress(b"not a frame", CompressionAlgorithm::Zstd).is_err());
    }
}
