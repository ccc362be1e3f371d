//! Key-value store implementations
//!
//! - `memory` - In-process store, used by tests and dry runs
//! - `sled_store` - On-disk store backed by sled
//!
//! Counters are stored as 8 big-endian bytes in both implementations.

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use crate::types::StoreError;

/// Decode a counter value written by `KeyValueStore::increment`
pub(crate) fn decode_counter(key: &str, bytes: &[u8]) -> Result<u64, StoreError> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::corrupt(key, format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}
