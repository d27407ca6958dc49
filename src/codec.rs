//! Wire codec for patch buffers

use crate::config::Config;
use crate::error::{Result, TabchainError};
use crate::patch::Patch;
use crate::FORMAT_VERSION;

/// Zstd frame magic number (little-endian).
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Encode a patch into a self-contained byte buffer, zstd-compressed
/// when the config enables compression.
pub fn encode_patch(config: &Config, patch: &Patch) -> Result<Vec<u8>> {
    let buf = serde_json::to_vec(patch)?;

    if !config.compression {
        log::info!(
            "Patch encoded: {} bytes (compression disabled)",
            buf.len()
        );
        return Ok(buf);
    }

    let compressed = zstd::encode_all(buf.as_slice(), config.compression_level)
        .map_err(TabchainError::Io)?;
    log::info!(
        "Patch encoded: {} bytes raw, {} bytes compressed ({:.0}% reduction)",
        buf.len(),
        compressed.len(),
        if buf.is_empty() {
            0.0
        } else {
            (1.0 - compressed.len() as f64 / buf.len() as f64) * 100.0
        }
    );
    Ok(compressed)
}

/// Decode a patch buffer, auto-detecting zstd compression by the frame
/// magic number. Rejects unknown format versions.
pub fn decode_patch(data: &[u8]) -> Result<Patch> {
    let bytes = if data.starts_with(&ZSTD_MAGIC) {
        zstd::decode_all(data)
            .map_err(|e| TabchainError::decode(format!("zstd decompression failed: {}", e)))?
    } else {
        data.to_vec()
    };

    let patch: Patch = serde_json::from_slice(&bytes)
        .map_err(|e| TabchainError::decode(format!("malformed patch buffer: {}", e)))?;

    if patch.version != FORMAT_VERSION {
        return Err(TabchainError::UnsupportedFormat {
            version: patch.version,
        });
    }

    Ok(patch)
}
