// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User-scoped record store.
//!
//! Each (collection, user) pair maps to one key holding either a JSON array
//! of records or a single JSON object. Reads never fail: missing or corrupt
//! data reads as empty. Writes replace the whole collection and are
//! best-effort; a failed write is logged and handed back to the caller, but
//! nothing is rolled back.

use crate::db::KeyValueBackend;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Errors from the persistence layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Storage quota exceeded ({needed} bytes needed, quota {quota})")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Failed to serialize records: {0}")]
    Serialize(String),
}

/// Result of a mutation whose in-memory value survives a failed write.
#[derive(Debug, Clone)]
#[must_use]
pub struct Persisted<T> {
    pub value: T,
    /// Set when the value could not be written to the backend.
    pub write_error: Option<StoreError>,
}

impl<T> Persisted<T> {
    pub fn new(value: T, write: Result<(), StoreError>) -> Self {
        Self {
            value,
            write_error: write.err(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.write_error.is_none()
    }

    /// Treat a failed write as an error, dropping the in-memory value.
    pub fn into_result(self) -> Result<T, StoreError> {
        match self.write_error {
            None => Ok(self.value),
            Some(e) => Err(e),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Persisted<U> {
        Persisted {
            value: f(self.value),
            write_error: self.write_error,
        }
    }
}

/// Record store shared by all registries.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by an unbounded in-memory map (tests, ephemeral runs).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::db::MemoryBackend::new()))
    }

    fn key(collection: &str, user_id: &str) -> String {
        format!("{}:{}", collection, user_id)
    }

    /// All records of a collection for a user; empty on missing or corrupt data.
    pub fn list<T: DeserializeOwned>(&self, collection: &str, user_id: &str) -> Vec<T> {
        self.read(collection, user_id).unwrap_or_default()
    }

    /// Replace a user's collection with `records`.
    pub fn save<T: Serialize>(
        &self,
        collection: &str,
        user_id: &str,
        records: &[T],
    ) -> Result<(), StoreError> {
        self.write(collection, user_id, records)
    }

    /// Single-object collection read; `None` on missing or corrupt data.
    pub fn load_object<T: DeserializeOwned>(&self, collection: &str, user_id: &str) -> Option<T> {
        self.read(collection, user_id)
    }

    /// Single-object collection write.
    pub fn save_object<T: Serialize>(
        &self,
        collection: &str,
        user_id: &str,
        object: &T,
    ) -> Result<(), StoreError> {
        self.write(collection, user_id, object)
    }

    /// Drop a user's collection entirely.
    pub fn remove(&self, collection: &str, user_id: &str) -> Result<(), StoreError> {
        self.backend.remove(&Self::key(collection, user_id))
    }

    fn read<T: DeserializeOwned>(&self, collection: &str, user_id: &str) -> Option<T> {
        let key = Self::key(collection, user_id);
        let raw = match self.backend.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read collection, treating as empty");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Corrupt collection data, treating as empty");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        user_id: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let key = Self::key(collection, user_id);
        let result = serde_json::to_string(value)
            .map_err(|e| StoreError::Serialize(e.to_string()))
            .and_then(|json| self.backend.set(&key, json));

        if let Err(e) = &result {
            tracing::warn!(key = %key, error = %e, "Failed to persist collection");
        }
        result
    }
}
