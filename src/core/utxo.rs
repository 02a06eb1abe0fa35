use crate::core::amount::Amount;
use crate::core::block::Block;
use crate::core::transaction::{OutPoint, Transaction};
use crate::{InvalidReason, LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentRecord {
    pub txid: String,
    pub index: u32,
    pub value: Amount,
    pub owner_hash: Vec<u8>,
}

impl UnspentRecord {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid.clone(), self.index)
    }
}

/// Read access to unspent outputs, as seen by transaction validation.
pub trait UtxoLookup {
    fn lookup(&self, outpoint: &OutPoint) -> Option<&UnspentRecord>;

    /// `true` when an earlier transaction of the same pending batch already
    /// consumed `outpoint`.
    fn spent_in_batch(&self, _outpoint: &OutPoint) -> bool {
        false
    }
}

/// Persisted form of the index, tagged with the chain tip it reflects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtxoSnapshot {
    pub tip: String,
    pub records: Vec<UnspentRecord>,
}

enum Change {
    Removed(UnspentRecord),
    Inserted(OutPoint),
}

/// Unspent outputs keyed by `(txid, output index)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoIndex {
    records: HashMap<OutPoint, UnspentRecord>,
}

impl UtxoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays `blocks` from genesis forward.
    pub fn rebuild(blocks: &[Block]) -> Result<Self> {
        let mut index = Self::new();
        for block in blocks {
            index.apply(block)?;
        }
        log::info!("🔄 UTXO index rebuilt from {} blocks ({} unspent outputs)", blocks.len(), index.len());
        Ok(index)
    }

    /// Applies every transaction of `block` in order. Either the whole block
    /// is applied or, on error, the index is left untouched.
    pub fn apply(&mut self, block: &Block) -> Result<()> {
        let mut journal = Vec::new();

        for tx in &block.transactions {
            if let Err(e) = self.apply_journaled(tx, &mut journal) {
                self.rollback(journal);
                return Err(e);
            }
        }

        log::debug!("UTXO index applied block {} ({} changes)", block.height, journal.len());
        Ok(())
    }

    /// Single-transaction variant of [`UtxoIndex::apply`].
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<()> {
        let mut journal = Vec::new();
        if let Err(e) = self.apply_journaled(tx, &mut journal) {
            self.rollback(journal);
            return Err(e);
        }
        Ok(())
    }

    fn apply_journaled(&mut self, tx: &Transaction, journal: &mut Vec<Change>) -> Result<()> {
        let txid = tx.id().ok_or(LedgerError::InvalidTransaction(InvalidReason::MissingId))?;

        // Spends first, then creations.
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                let missing = || LedgerError::UtxoConsistency {
                    txid: input.prev_tx_id.clone(),
                    index: input.output_index.max(0) as u32,
                    reason: "spent output is not in the index".to_string(),
                };
                let outpoint = input.outpoint().ok_or_else(missing)?;
                let removed = self.records.remove(&outpoint).ok_or_else(missing)?;
                journal.push(Change::Removed(removed));
            }
        }

        for (index, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint::new(txid, index as u32);
            let record = UnspentRecord {
                txid: txid.to_string(),
                index: index as u32,
                value: output.value,
                owner_hash: output.owner_hash.clone(),
            };
            if self.records.contains_key(&outpoint) {
                return Err(LedgerError::UtxoConsistency {
                    txid: txid.to_string(),
                    index: index as u32,
                    reason: "created output is already unspent".to_string(),
                });
            }
            self.records.insert(outpoint.clone(), record);
            journal.push(Change::Inserted(outpoint));
        }

        Ok(())
    }

    fn rollback(&mut self, journal: Vec<Change>) {
        for change in journal.into_iter().rev() {
            match change {
                Change::Removed(record) => {
                    self.records.insert(record.outpoint(), record);
                }
                Change::Inserted(outpoint) => {
                    self.records.remove(&outpoint);
                }
            }
        }
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UnspentRecord> {
        self.records.get(outpoint)
    }

    /// Linear scan; order is unspecified.
    pub fn find_by_owner(&self, owner_hash: &[u8]) -> Vec<UnspentRecord> {
        self.records
            .values()
            .filter(|record| record.owner_hash == owner_hash)
            .cloned()
            .collect()
    }

    pub fn balance_of(&self, owner_hash: &[u8]) -> Amount {
        self.find_by_owner(owner_hash).into_iter().map(|record| record.value).sum()
    }

    pub fn total_value(&self) -> Amount {
        self.records.values().map(|record| record.value).sum()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_snapshot(&self, tip: &str) -> UtxoSnapshot {
        let mut records: Vec<UnspentRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| (&a.txid, a.index).cmp(&(&b.txid, b.index)));
        UtxoSnapshot {
            tip: tip.to_string(),
            records,
        }
    }

    pub fn from_snapshot(snapshot: UtxoSnapshot) -> Self {
        let records = snapshot
            .records
            .into_iter()
            .map(|record| (record.outpoint(), record))
            .collect();
        Self { records }
    }
}

impl UtxoLookup for UtxoIndex {
    fn lookup(&self, outpoint: &OutPoint) -> Option<&UnspentRecord> {
        self.get(outpoint)
    }
}

/// The index as it would look after the staged transactions of a pending
/// batch, without touching the index itself.
pub struct PendingView<'a> {
    base: &'a UtxoIndex,
    spent: HashSet<OutPoint>,
    created: HashMap<OutPoint, UnspentRecord>,
}

impl<'a> PendingView<'a> {
    pub fn new(base: &'a UtxoIndex) -> Self {
        Self {
            base,
            spent: HashSet::new(),
            created: HashMap::new(),
        }
    }

    /// Records the effect of an already-validated transaction.
    pub fn stage(&mut self, tx: &Transaction) {
        if !tx.is_coinbase() {
            for outpoint in tx.inputs.iter().filter_map(|input| input.outpoint()) {
                self.created.remove(&outpoint);
                self.spent.insert(outpoint);
            }
        }

        if let Some(txid) = tx.id() {
            for (index, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint::new(txid, index as u32);
                self.spent.remove(&outpoint);
                self.created.insert(
                    outpoint,
                    UnspentRecord {
                        txid: txid.to_string(),
                        index: index as u32,
                        value: output.value,
                        owner_hash: output.owner_hash.clone(),
                    },
                );
            }
        }
    }
}

impl UtxoLookup for PendingView<'_> {
    fn lookup(&self, outpoint: &OutPoint) -> Option<&UnspentRecord> {
        if let Some(record) = self.created.get(outpoint) {
            return Some(record);
        }
        if self.spent.contains(outpoint) {
            return None;
        }
        self.base.get(outpoint)
    }

    fn spent_in_batch(&self, outpoint: &OutPoint) -> bool {
        self.spent.contains(outpoint) && !self.created.contains_key(outpoint)
    }
}
