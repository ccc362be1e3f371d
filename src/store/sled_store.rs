//! On-disk key-value store backed by sled
//!
//! Atomic multi-key operations run inside sled transactions; sled retries a
//! transaction closure on conflict, so the closures below are free of side
//! effects beyond the transactional tree.

use super::decode_counter;
use crate::core::traits::KeyValueStore;
use crate::types::StoreError;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use std::path::Path;

/// Persistent store for the account registry
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// Database that is deleted when dropped
    pub fn temporary() -> Result<Self, StoreError> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

fn flatten(error: TransactionError<StoreError>) -> StoreError {
    match error {
        TransactionError::Abort(error) => error,
        TransactionError::Storage(error) => error.into(),
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key.as_bytes())?.map(|value| value.to_vec()))
    }

    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for (key, value) in entries {
            batch.insert(key.as_bytes(), value.as_slice());
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn insert_if_absent(
        &self,
        guard_key: &str,
        entries: &[(String, Vec<u8>)],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let result: TransactionResult<Option<Vec<u8>>, StoreError> = self.db.transaction(|tx| {
            if let Some(existing) = tx.get(guard_key.as_bytes())? {
                return Ok(Some(existing.to_vec()));
            }
            for (key, value) in entries {
                tx.insert(key.as_bytes(), value.as_slice())?;
            }
            Ok(None)
        });
        result.map_err(flatten)
    }

    fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let result: TransactionResult<u64, StoreError> = self.db.transaction(|tx| {
            let current = match tx.get(key.as_bytes())? {
                Some(bytes) => {
                    decode_counter(key, &bytes).map_err(ConflictableTransactionError::Abort)?
                }
                None => 0,
            };
            let next = current + 1;
            tx.insert(key.as_bytes(), &next.to_be_bytes()[..])?;
            Ok(next)
        });
        result.map_err(flatten)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.db
            .scan_prefix(prefix.as_bytes())
            .map(|item| {
                let (key, value) = item?;
                let key = String::from_utf8(key.to_vec())
                    .map_err(|e| StoreError::corrupt(&String::from_utf8_lossy(&key), e))?;
                Ok((key, value.to_vec()))
            })
            .collect()
    }
}
