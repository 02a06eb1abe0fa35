use crate::core::{Amount, OutPoint, Transaction, TxInput, TxOutput};
use crate::crypto::hash::Hash160;
use crate::crypto::keys::{KeyPair, PrivateKey};
use crate::storage::Database;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub name: String,
    pub address: String,
    /// Hex owner hash that outputs paying this wallet are locked to.
    pub owner_hash: String,
    pub public_key: String,
    pub created_at: i64,
}

/// Stored form of a wallet: its public info plus the WIF private key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub info: WalletInfo,
    pub wif: String,
}

/// A named single-key wallet.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub info: WalletInfo,
    keypair: KeyPair,
}

impl Wallet {
    pub fn new(name: &str) -> Result<Self> {
        Self::from_keypair(name, KeyPair::new()?)
    }

    pub fn from_wif(name: &str, wif: &str) -> Result<Self> {
        Self::from_keypair(name, KeyPair::from_private_key(PrivateKey::from_wif(wif)?))
    }

    fn from_keypair(name: &str, keypair: KeyPair) -> Result<Self> {
        validate_name(name)?;

        let info = WalletInfo {
            name: name.to_string(),
            address: keypair.address(),
            owner_hash: keypair.owner_hash().to_hex(),
            public_key: keypair.public_key.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        };

        Ok(Self { info, keypair })
    }

    pub fn from_record(record: WalletRecord) -> Result<Self> {
        let keypair = KeyPair::from_private_key(PrivateKey::from_wif(&record.wif)?);
        if keypair.address() != record.info.address {
            return Err(LedgerError::Wallet(format!(
                "Stored key does not match address of wallet {}",
                record.info.name
            )));
        }

        Ok(Self {
            info: record.info,
            keypair,
        })
    }

    pub fn to_record(&self) -> WalletRecord {
        WalletRecord {
            info: self.info.clone(),
            wif: self.keypair.private_key.to_wif(),
        }
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn owner_hash(&self) -> Hash160 {
        self.keypair.owner_hash()
    }

    pub fn address(&self) -> &str {
        &self.info.address
    }

    pub fn export_private_key(&self) -> String {
        self.keypair.private_key.to_wif()
    }

    /// Signed, id-assigned transaction spending exactly `inputs`. The caller
    /// chooses the inputs and any change output.
    pub fn build_transfer(&self, inputs: Vec<OutPoint>, outputs: Vec<(Hash160, Amount)>) -> Result<Transaction> {
        if inputs.is_empty() {
            return Err(LedgerError::Wallet("A transfer needs at least one input".to_string()));
        }
        if outputs.is_empty() {
            return Err(LedgerError::Wallet("A transfer needs at least one output".to_string()));
        }

        let inputs = inputs
            .into_iter()
            .map(|outpoint| TxInput::spending(outpoint.txid, outpoint.index))
            .collect::<Result<Vec<_>>>()?;
        let outputs = outputs
            .iter()
            .map(|(owner, value)| TxOutput::new(*value, owner))
            .collect();

        let mut tx = Transaction::new(inputs, outputs);
        tx.sign_all(&self.keypair)?;
        let txid = tx.set_id()?;

        log::info!("💸 Wallet {} built transaction {}", self.info.name, txid);
        Ok(tx)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if !valid {
        return Err(LedgerError::Wallet(format!("Invalid wallet name: {:?}", name)));
    }
    Ok(())
}

/// Named wallets persisted in the database's wallet tree.
#[derive(Debug, Clone)]
pub struct WalletStore {
    db: Arc<Database>,
}

impl WalletStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create(&self, name: &str) -> Result<Wallet> {
        self.insert(Wallet::new(name)?)
    }

    pub fn import(&self, name: &str, wif: &str) -> Result<Wallet> {
        self.insert(Wallet::from_wif(name, wif)?)
    }

    fn insert(&self, wallet: Wallet) -> Result<Wallet> {
        if self.db.get_wallet(&wallet.info.name)?.is_some() {
            return Err(LedgerError::Wallet(format!("Wallet already exists: {}", wallet.info.name)));
        }

        self.db.save_wallet(&wallet.to_record())?;
        log::info!("👛 Created wallet {} ({})", wallet.info.name, wallet.info.address);
        Ok(wallet)
    }

    pub fn load(&self, name: &str) -> Result<Wallet> {
        let record = self.db.get_wallet(name)?
            .ok_or_else(|| LedgerError::Wallet(format!("Wallet not found: {}", name)))?;
        Wallet::from_record(record)
    }

    /// Removes the wallet and its key. Outputs it owns stay on the chain.
    pub fn delete(&self, name: &str) -> Result<()> {
        if !self.db.delete_wallet(name)? {
            return Err(LedgerError::Wallet(format!("Wallet not found: {}", name)));
        }
        log::info!("🗑️ Deleted wallet {}", name);
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<WalletInfo>> {
        let mut wallets: Vec<WalletInfo> = self.db.list_wallets()?
            .into_iter()
            .map(|record| record.info)
            .collect();
        wallets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(wallets)
    }
}
