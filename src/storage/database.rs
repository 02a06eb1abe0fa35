use crate::storage::BlobStore;
use crate::wallet::WalletRecord;
use crate::{LedgerError, Result};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;

// Tree names
const TREE_LEDGER: &str = "ledger";
const TREE_WALLETS: &str = "wallets";

/// sled-backed store. Chain and UTXO blobs live in one tree, wallet keys in
/// another.
#[derive(Debug, Clone)]
pub struct Database {
    db: Arc<Db>,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| LedgerError::Persistence(format!("Failed to open database: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
        })
    }

    fn get_tree(&self, tree_name: &str) -> Result<Tree> {
        self.db.open_tree(tree_name)
            .map_err(|e| LedgerError::Persistence(format!("Failed to open tree {}: {}", tree_name, e)))
    }

    // Wallet operations
    pub fn save_wallet(&self, record: &WalletRecord) -> Result<()> {
        let wallet_tree = self.get_tree(TREE_WALLETS)?;
        let data = bincode::serialize(record)
            .map_err(|e| LedgerError::Persistence(format!("Failed to serialize wallet: {}", e)))?;

        wallet_tree.insert(record.info.name.as_bytes(), data)
            .map_err(|e| LedgerError::Persistence(format!("Failed to save wallet: {}", e)))?;
        wallet_tree.flush()
            .map_err(|e| LedgerError::Persistence(format!("Failed to flush wallets: {}", e)))?;

        log::debug!("💾 Saved wallet {}", record.info.name);
        Ok(())
    }

    pub fn get_wallet(&self, name: &str) -> Result<Option<WalletRecord>> {
        let wallet_tree = self.get_tree(TREE_WALLETS)?;

        match wallet_tree.get(name.as_bytes())
            .map_err(|e| LedgerError::Persistence(format!("Failed to get wallet: {}", e)))? {
            Some(data) => {
                let record: WalletRecord = bincode::deserialize(&data)
                    .map_err(|e| LedgerError::Persistence(format!("Failed to deserialize wallet: {}", e)))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn list_wallets(&self) -> Result<Vec<WalletRecord>> {
        let wallet_tree = self.get_tree(TREE_WALLETS)?;
        let mut wallets = Vec::new();

        for item in wallet_tree.iter() {
            match item {
                Ok((key, value)) => match bincode::deserialize::<WalletRecord>(&value) {
                    Ok(record) => wallets.push(record),
                    Err(e) => log::warn!("Skipping unreadable wallet {}: {}", String::from_utf8_lossy(&key), e),
                },
                Err(e) => {
                    log::warn!("Error iterating wallets: {}", e);
                    break;
                }
            }
        }

        Ok(wallets)
    }

    pub fn delete_wallet(&self, name: &str) -> Result<bool> {
        let wallet_tree = self.get_tree(TREE_WALLETS)?;

        let removed = wallet_tree.remove(name.as_bytes())
            .map_err(|e| LedgerError::Persistence(format!("Failed to delete wallet: {}", e)))?;

        log::debug!("🗑️ Deleted wallet {}", name);
        Ok(removed.is_some())
    }

    // Database maintenance
    pub fn flush(&self) -> Result<()> {
        self.db.flush()
            .map_err(|e| LedgerError::Persistence(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }

    pub fn get_database_stats(&self) -> Result<DatabaseStats> {
        let ledger_tree = self.get_tree(TREE_LEDGER)?;
        let blob_size = |key: &str| -> Result<usize> {
            Ok(ledger_tree
                .get(key.as_bytes())
                .map_err(|e| LedgerError::Persistence(format!("Failed to read {}: {}", key, e)))?
                .map(|value| value.len())
                .unwrap_or(0))
        };

        Ok(DatabaseStats {
            chain_size: blob_size(crate::storage::CHAIN_KEY)?,
            utxo_size: blob_size(crate::storage::UTXO_KEY)?,
            wallet_count: self.get_tree(TREE_WALLETS)?.len(),
            total_size: self.db.size_on_disk().unwrap_or(0),
        })
    }
}

impl BlobStore for Database {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let ledger_tree = self.get_tree(TREE_LEDGER)?;

        ledger_tree.insert(key.as_bytes(), bytes)
            .map_err(|e| LedgerError::Persistence(format!("Failed to save {}: {}", key, e)))?;
        ledger_tree.flush()
            .map_err(|e| LedgerError::Persistence(format!("Failed to flush {}: {}", key, e)))?;

        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let ledger_tree = self.get_tree(TREE_LEDGER)?;

        Ok(ledger_tree.get(key.as_bytes())
            .map_err(|e| LedgerError::Persistence(format!("Failed to get {}: {}", key, e)))?
            .map(|value| value.to_vec()))
    }

    fn close(&self) -> Result<()> {
        self.flush()?;
        log::debug!("💾 Database closed");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DatabaseStats {
    pub chain_size: usize,
    pub utxo_size: usize,
    pub wallet_count: usize,
    pub total_size: u64,
}
