// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-file tail state with rotation detection.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{info, warn};

/// Captured identity of the underlying file.
///
/// On Unix the (device, inode) pair survives renames, so a changed pair
/// means the path now points at a different file. Platforms without inodes
/// fall back to size-decrease detection alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

fn identity_of(metadata: &std::fs::Metadata) -> Option<FileIdentity> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(FileIdentity { dev: metadata.dev(), ino: metadata.ino() })
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        None
    }
}

/// Watches one file, tracking byte offset and rotation.
pub struct FileWatcher {
    path: PathBuf,
    pub offset: u64,
    identity: Option<FileIdentity>,
    last_size: u64,
    encoding: &'static encoding_rs::Encoding,
}

impl FileWatcher {
    pub fn new(path: impl Into<PathBuf>, offset: u64, encoding: &'static encoding_rs::Encoding) -> Self {
        let path = path.into();
        let (identity, last_size) = match std::fs::metadata(&path) {
            Ok(meta) => (identity_of(&meta), meta.len()),
            Err(_) => (None, 0),
        };
        Self { path, offset, identity, last_size, encoding }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotation is declared when the identity changed or the file shrank.
    fn has_rotated(&self, metadata: &std::fs::Metadata) -> bool {
        if let (Some(old), Some(new)) = (self.identity, identity_of(metadata)) {
            if old != new {
                return true;
            }
        }
        metadata.len() < self.last_size
    }

    /// Read new complete lines since the last poll, up to `max_lines`.
    ///
    /// The offset only advances past newline-terminated bytes: an
    /// unterminated final line is a partial write and stays unconsumed
    /// until its newline arrives on a later poll. The one exception is the
    /// poll that detected a rotation, where end-of-file delimits the old
    /// content's last line. Bytes are decoded with the configured encoding,
    /// replacing invalid sequences.
    pub async fn read_new_lines(&mut self, max_lines: usize) -> std::io::Result<Vec<String>> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(meta) => meta,
            // Path vanished; keep state, discovery will drop the watcher
            Err(_) => return Ok(Vec::new()),
        };

        let rotated = self.has_rotated(&metadata);
        if rotated {
            info!(path = %self.path.display(), "file rotation detected");
            self.offset = 0;
        }

        let file = File::open(&self.path).await?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.offset)).await?;

        let mut lines = Vec::new();
        let mut buf = Vec::new();
        while lines.len() < max_lines {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).await?;
            if read == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') && !rotated {
                // Partial trailing write; the next poll re-reads it
                break;
            }
            self.offset += read as u64;

            while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
                buf.pop();
            }
            let (decoded, _, had_errors) = self.encoding.decode(&buf);
            if had_errors {
                warn!(path = %self.path.display(), "replaced invalid byte sequences while decoding");
            }
            lines.push(decoded.into_owned());
        }

        // Refresh identity after the read so the next poll compares
        // against what we just consumed.
        if let Ok(meta) = std::fs::metadata(&self.path) {
            self.identity = identity_of(&meta);
            self.last_size = meta.len();
        }

        Ok(lines)
    }

    /// Force the read position (admin operation).
    pub fn reset_position(&mut self, offset: u64) {
        self.offset = offset;
        info!(path = %self.path.display(), offset, "reset watcher position");
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
