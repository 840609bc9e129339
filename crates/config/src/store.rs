// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration store: load, persist, and hot-reload the agent config.

use crate::types::{AgentConfig, CollectorConfig};
use crate::validate;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use sw_core::ConfigError;
use tracing::{info, warn};

/// Owns the on-disk configuration document and the active in-memory copy.
///
/// Consumers hold `Arc<AgentConfig>` snapshots; a successful reload swaps
/// the active pointer, failed reloads leave it untouched.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<AgentConfig>>,
    hash: Mutex<Option<String>>,
    last_mtime: Mutex<Option<SystemTime>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(AgentConfig::default())),
            hash: Mutex::new(None),
            last_mtime: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Active configuration snapshot.
    pub fn current(&self) -> Arc<AgentConfig> {
        Arc::clone(&self.current.read())
    }

    /// Load (or synthesize) the configuration document.
    ///
    /// A missing file is replaced by the default document, persisted before
    /// continuing so operators can inspect and edit it.
    pub fn load(&self) -> Result<Arc<AgentConfig>, ConfigError> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "configuration file not found, creating default");
            self.save(&AgentConfig::synthesized_default())?;
        }

        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::Read { path: self.path.clone(), source: e })?;
        let doc: Value = serde_json::from_str(&raw)?;

        validate::validate(&doc)?;
        validate::validate_paths(&doc)?;

        let config: AgentConfig = serde_json::from_value(doc.clone())?;

        *self.hash.lock() = Some(config_hash(&doc));
        *self.last_mtime.lock() = file_mtime(&self.path);
        *self.current.write() = Arc::new(config);

        info!(path = %self.path.display(), "configuration loaded");
        Ok(self.current())
    }

    /// Persist `config` and adopt it as the active document.
    pub fn save(&self, config: &AgentConfig) -> Result<(), ConfigError> {
        let doc = serde_json::to_value(config)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Write { path: self.path.clone(), source: e })?;
        }
        let pretty = serde_json::to_string_pretty(&doc)?;
        std::fs::write(&self.path, pretty)
            .map_err(|e| ConfigError::Write { path: self.path.clone(), source: e })?;

        *self.hash.lock() = Some(config_hash(&doc));
        *self.last_mtime.lock() = file_mtime(&self.path);
        *self.current.write() = Arc::new(config.clone());
        Ok(())
    }

    /// True when the file mtime has advanced and the content hash differs.
    pub fn check_for_updates(&self) -> bool {
        let Some(mtime) = file_mtime(&self.path) else {
            return false;
        };
        {
            let last = self.last_mtime.lock();
            if let Some(last) = *last {
                if mtime <= last {
                    return false;
                }
            }
        }

        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return false;
        };
        let Ok(doc) = serde_json::from_str::<Value>(&raw) else {
            return false;
        };

        let new_hash = config_hash(&doc);
        let changed = self.hash.lock().as_deref() != Some(new_hash.as_str());
        if changed {
            *self.last_mtime.lock() = Some(mtime);
        }
        changed
    }

    /// Reload if the document changed. Returns the new snapshot on change.
    ///
    /// Validation failure leaves the running configuration in place.
    pub fn reload(&self) -> Result<Option<Arc<AgentConfig>>, ConfigError> {
        if !self.check_for_updates() {
            return Ok(None);
        }
        match self.load() {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!(error = %e, "configuration reload failed, keeping current document");
                Err(e)
            }
        }
    }
}

/// SHA-256 over the canonicalized (key-sorted) document.
pub fn config_hash(doc: &Value) -> String {
    let canonical = doc.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{digest:x}")
}

/// Hash of one collector descriptor; drives restart-on-change semantics.
pub fn collector_hash(collector: &CollectorConfig) -> String {
    match serde_json::to_value(collector) {
        Ok(doc) => config_hash(&doc),
        Err(_) => String::new(),
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
