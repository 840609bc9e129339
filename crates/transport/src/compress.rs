// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request body compression.

use flate2::write::GzEncoder;
use std::io::Write;
use sw_config::{CompressionAlgorithm, CompressionConfig};
use tracing::{debug, warn};

/// Compress `body` per config.
///
/// Returns `(bytes, content_encoding)`. The compressed form is used only
/// when it is strictly smaller than the input; `content_encoding` is `None`
/// when the body goes out raw.
pub fn compress_body(body: Vec<u8>, config: &CompressionConfig) -> (Vec<u8>, Option<&'static str>) {
    if !config.enabled || body.len() < config.min_size {
        return (body, None);
    }

    let (encoded, encoding) = match config.algorithm {
        CompressionAlgorithm::Zstd => (zstd::encode_all(body.as_slice(), config.level), "zstd"),
        CompressionAlgorithm::Gzip => (gzip(&body, config.level), "gzip"),
        // lz4 validates in config but is not wired; zstd stands in
        CompressionAlgorithm::Lz4 => (zstd::encode_all(body.as_slice(), config.level), "zstd"),
    };

    match encoded {
        Ok(compressed) if compressed.len() < body.len() => {
            debug!(
                raw = body.len(),
                compressed = compressed.len(),
                encoding,
                "compressed request body"
            );
            (compressed, Some(encoding))
        }
        Ok(_) => (body, None),
        Err(e) => {
            warn!(error = %e, "compression failed, sending uncompressed");
            (body, None)
        }
    }
}

fn gzip(body: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    let level = flate2::Compression::new(level.clamp(0, 9) as u32);
    let mut encoder = GzEncoder::new(Vec::new(), level);
    encoder.write_all(body)?;
    encoder.finish()
}

#[cfg(test)]
#[path = "compress_tests.rs"]
mod tests;
