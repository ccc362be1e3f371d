//! In-process key-value store
//!
//! `MemoryStore` keeps every entry in one ordered map behind a single lock,
//! so multi-key writes (`put_all`, `insert_if_absent`) are atomic.

use super::decode_counter;
use crate::core::traits::KeyValueStore;
use crate::types::StoreError;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Volatile store for tests and simulated runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>, StoreError> {
        self.entries.read().map_err(|_| StoreError::Backend {
            message: "memory store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>, StoreError> {
        self.entries.write().map_err(|_| StoreError::Backend {
            message: "memory store lock poisoned".to_string(),
        })
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<(), StoreError> {
        let mut map = self.write()?;
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn insert_if_absent(
        &self,
        guard_key: &str,
        entries: &[(String, Vec<u8>)],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let mut map = self.write()?;
        if let Some(existing) = map.get(guard_key) {
            return Ok(Some(existing.clone()));
        }
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(None)
    }

    fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut map = self.write()?;
        let current = match map.get(key) {
            Some(bytes) => decode_counter(key, bytes)?,
            None => 0,
        };
        let next = current + 1;
        map.insert(key.to_string(), next.to_be_bytes().to_vec());
        Ok(next)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .read()?
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
