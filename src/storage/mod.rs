//! Raw blob persistence for the chain and its UTXO snapshot

pub mod database;
pub mod memory;

pub use database::{Database, DatabaseStats};
pub use memory::MemoryStore;

use crate::{LedgerError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Key of the full-chain blob.
pub const CHAIN_KEY: &str = "chain";
/// Key of the UTXO snapshot blob.
pub const UTXO_KEY: &str = "utxo";

/// Opaque byte store. Every `put` is a full overwrite of the key.
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn close(&self) -> Result<()>;
}

/// Encodes `value` with bincode and writes it under `key`.
pub fn put_encoded<T: Serialize>(store: &dyn BlobStore, key: &str, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)
        .map_err(|e| LedgerError::Persistence(format!("Failed to encode {}: {}", key, e)))?;
    store.put(key, &bytes)?;
    log::debug!("💾 Saved {} ({} bytes)", key, bytes.len());
    Ok(())
}

pub fn get_decoded<T: DeserializeOwned>(store: &dyn BlobStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => {
            let value = bincode::deserialize(&bytes)
                .map_err(|e| LedgerError::Persistence(format!("Failed to decode {}: {}", key, e)))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}
