use std::io::Read;

use anyhow::{Context, Result};
use bytes::Bytes;
#[cfg(feature = "compression-gzip")]
use flate2::read::GzDecoder;

/// Compression formats detected by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Uncompressed,
}

/// Magic byte detection and decompression for guide downloads
pub struct DecompressionService;

impl DecompressionService {
    /// Detect compression format using magic bytes
    pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
        match infer::get(data) {
            Some(kind) if kind.mime_type() == "application/gzip" => CompressionFormat::Gzip,
            _ => CompressionFormat::Uncompressed,
        }
    }

    /// Decompress data based on detected format
    pub fn decompress(data: Bytes) -> Result<Vec<u8>> {
        match Self::detect_compression_format(&data) {
            CompressionFormat::Gzip => Self::decompress_gzip(data),
            CompressionFormat::Uncompressed => Ok(data.to_vec()),
        }
    }

    #[cfg(feature = "compression-gzip")]
    fn decompress_gzip(data: Bytes) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data.as_ref());
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .context("Failed to decompress gzip data")?;
        Ok(decompressed)
    }

    #[cfg(not(feature = "compression-gzip"))]
    fn decompress_gzip(_data: Bytes) -> Result<Vec<u8>> {
        anyhow::bail!("gzip support is disabled (enable the compression-gzip feature)")
    }
}
