// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue payload encoding: JSON bytes, zlib-deflated above a threshold.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use sw_core::QueueError;

/// Serialize-adjacent compression step for queue payloads.
///
/// Returns `(bytes, compressed)`. The compressed form is stored only when it
/// is strictly smaller than the raw JSON, so a set flag always implies a
/// size win.
pub fn compress_payload(json: Vec<u8>, threshold: usize) -> (Vec<u8>, bool) {
    if json.len() <= threshold {
        return (json, false);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
    let compressed = encoder
        .write_all(&json)
        .and_then(|()| encoder.finish());
    match compressed {
        Ok(deflated) if deflated.len() < json.len() => (deflated, true),
        Ok(_) => (json, false),
        Err(e) => {
            tracing::warn!(error = %e, "payload compression failed, storing raw");
            (json, false)
        }
    }
}

/// Inverse of [`compress_payload`].
pub fn decompress_payload(data: &[u8], compressed: bool) -> Result<Vec<u8>, QueueError> {
    if !compressed {
        return Ok(data.to_vec());
    }
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| QueueError::Decompress(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
