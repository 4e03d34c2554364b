//! Concurrency-safe keyed store

use crate::error::{RegistryError, Result};
use dashmap::DashMap;

/// String-keyed map shared between concurrent pipelines.
///
/// `get_or_set` is atomic per key: when many callers race on an absent key,
/// exactly one default is installed and every caller gets that value back.
pub struct KeyedStore<T> {
    name: String,
    entries: DashMap<String, T>,
}

impl<T: Clone> KeyedStore<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value for `key`; never blocks
    pub fn get(&self, key: &str) -> Result<T> {
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound {
                store: self.name.clone(),
                key: key.to_string(),
            })
    }

    /// Unconditional overwrite
    pub fn update(&self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), value);
    }

    /// Install `default` if `key` is absent, then return the stored value.
    ///
    /// When the key is already present `default` is dropped.
    pub fn get_or_set(&self, key: impl Into<String>, default: T) -> T {
        self.entries.entry(key.into()).or_insert(default).value().clone()
    }

    /// Like `get_or_set`, but only builds the default when it is needed
    pub fn get_or_insert_with(&self, key: impl Into<String>, make: impl FnOnce() -> T) -> T {
        self.entries.entry(key.into()).or_insert_with(make).value().clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

impl<T> std::fmt::Debug for KeyedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedStore")
            .field("name", &self.name)
            .field("len", &self.entries.len())
            .finish()
    }
}
