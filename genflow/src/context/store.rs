//! Thread-safe per-request key-value handoff and diagnostic logs.

use crate::errors::StoreConflictError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Key-value store middlewares use to hand data to later middlewares.
///
/// Middlewares in the same level must use disjoint keys. [`try_insert`]
/// reports a collision instead of overwriting.
///
/// [`try_insert`]: ContextStore::try_insert
#[derive(Debug, Default)]
pub struct ContextStore {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl ContextStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().get(key).cloned()
    }

    /// Gets a value and deserializes it. Returns `None` on a type mismatch.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a value, overwriting any previous one.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.data.write().insert(key.into(), value);
    }

    /// Inserts a value only if the key is free.
    ///
    /// # Errors
    ///
    /// Returns `StoreConflictError` if the key already exists.
    pub fn try_insert(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), StoreConflictError> {
        let key = key.into();
        let mut data = self.data.write();

        if data.contains_key(&key) {
            return Err(StoreConflictError::new(key));
        }

        data.insert(key, value);
        Ok(())
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.data.write().remove(key)
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

/// Per-middleware diagnostic log entries.
#[derive(Debug, Default)]
pub struct MiddlewareLogs {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MiddlewareLogs {
    /// Creates an empty log map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the log entry for a middleware, replacing any previous one.
    pub fn set(&self, middleware: impl Into<String>, data: serde_json::Value) {
        self.entries.write().insert(middleware.into(), data);
    }

    /// Returns the entry for a middleware.
    #[must_use]
    pub fn get(&self, middleware: &str) -> Option<serde_json::Value> {
        self.entries.read().get(middleware).cloned()
    }

    /// Returns a copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.entries.read().clone()
    }
}
