// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Key-value backends for the record store.
//!
//! Values are opaque strings (serialized JSON). There is no locking across
//! keys or processes: each `set` replaces the whole value and the last
//! writer wins.

use crate::db::StoreError;
use dashmap::DashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Durable string storage addressed by key.
pub trait KeyValueBackend: Send + Sync {
    /// Read a value, `None` if the key has never been written.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ─── File Backend ────────────────────────────────────────────────────────────

/// One JSON file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) a data directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StoreError::Io(e.to_string()))?;
        tracing::info!(path = %root.display(), "Opened file record store");
        Ok(Self { root })
    }

    /// Keys contain ':' and '@', so they are percent-encoded into file names.
    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        // Write-then-rename so readers never observe a half-written file.
        fs::write(&tmp, value.as_bytes()).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }
}

// ─── Memory Backend ──────────────────────────────────────────────────────────

/// In-memory backend, optionally with a total byte quota.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects writes once the stored bytes would exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Store a raw value, bypassing serialization (used to plant corrupt data).
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key() != key)
            .map(|e| e.key().len() + e.value().len())
            .sum()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        if let Some(quota) = self.quota_bytes {
            let needed = self.used_bytes_excluding(key) + key.len() + value.len();
            if needed > quota {
                return Err(StoreError::QuotaExceeded { needed, quota });
            }
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
