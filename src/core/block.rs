use crate::core::Transaction;
use crate::crypto::hash::Hash256;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    /// Unix seconds.
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    /// Empty for genesis.
    pub prev_hash: String,
    /// Empty until mined.
    pub hash: String,
    pub nonce: u64,
}

impl Block {
    /// Candidate block: `nonce = 0`, no hash yet.
    pub fn new(height: u64, prev_hash: String, transactions: Vec<Transaction>) -> Self {
        Self {
            height,
            timestamp: Utc::now().timestamp(),
            transactions,
            prev_hash,
            hash: String::new(),
            nonce: 0,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.prev_hash.is_empty()
    }

    pub fn is_mined(&self) -> bool {
        !self.hash.is_empty()
    }

    /// Merkle root over the transactions, or the zero hash when there are
    /// none. Each leaf commits to the recomputed content hash and the stored
    /// id, and the root commits to the transaction count, so repeating the
    /// last transaction of an odd level changes it.
    pub fn merkle_root(&self) -> Hash256 {
        Self::calculate_merkle_root(&self.transactions)
    }

    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Hash256 {
        if transactions.is_empty() {
            return Hash256::zero();
        }

        let mut hashes: Vec<Hash256> = transactions.iter().map(Self::leaf).collect();

        while hashes.len() > 1 {
            let mut next_level = Vec::with_capacity((hashes.len() + 1) / 2);

            for chunk in hashes.chunks(2) {
                // Odd count: pair the last hash with itself
                let right = chunk.get(1).unwrap_or(&chunk[0]);

                let mut bytes = Vec::with_capacity(64);
                bytes.extend_from_slice(chunk[0].as_bytes());
                bytes.extend_from_slice(right.as_bytes());
                next_level.push(Hash256::hash(&bytes));
            }

            hashes = next_level;
        }

        let mut bytes = Vec::with_capacity(40);
        bytes.extend_from_slice(&(transactions.len() as u64).to_be_bytes());
        bytes.extend_from_slice(hashes[0].as_bytes());
        Hash256::hash(&bytes)
    }

    fn leaf(tx: &Transaction) -> Hash256 {
        let mut bytes = tx.compute_hash().as_bytes().to_vec();
        bytes.extend_from_slice(tx.id().unwrap_or_default().as_bytes());
        Hash256::hash(&bytes)
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.is_coinbase())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn contains_transaction(&self, txid: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id() == Some(txid))
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        bincode::serialize(self).map(|data| data.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Amount;

    fn coinbase(tag: &str) -> Transaction {
        Transaction::new_coinbase(vec![1u8; 20], Amount::from_coins(50), tag)
    }

    #[test]
    fn test_block_creation() {
        let block = Block::new(3, "ab".repeat(32), vec![coinbase("test")]);

        assert_eq!(block.height, 3);
        assert_eq!(block.nonce, 0);
        assert!(!block.is_mined());
        assert!(!block.is_genesis());
        assert_eq!(block.transaction_count(), 1);
        assert!(block.coinbase().is_some());
    }

    #[test]
    fn test_merkle_root_calculation() {
        let one = vec![coinbase("a")];
        let two = vec![coinbase("a"), coinbase("b")];
        let three = vec![coinbase("a"), coinbase("b"), coinbase("c")];

        assert_eq!(Block::calculate_merkle_root(&[]), Hash256::zero());
        assert_ne!(Block::calculate_merkle_root(&one), Hash256::zero());
        assert_ne!(Block::calculate_merkle_root(&two), Block::calculate_merkle_root(&three));

        let mut swapped = two.clone();
        swapped.swap(0, 1);
        assert_ne!(Block::calculate_merkle_root(&two), Block::calculate_merkle_root(&swapped));
    }

    #[test]
    fn test_merkle_root_commits_to_count() {
        let three = vec![coinbase("a"), coinbase("b"), coinbase("c")];
        let mut repeated = three.clone();
        repeated.push(coinbase("c"));

        assert_ne!(Block::calculate_merkle_root(&three), Block::calculate_merkle_root(&repeated));
    }

    #[test]
    fn test_size_grows_with_transactions() {
        let empty = Block::new(1, "ab".repeat(32), vec![]);
        let full = Block::new(1, "ab".repeat(32), vec![coinbase("a")]);
        assert!(empty.size() > 0);
        assert!(full.size() > empty.size());
    }

    #[test]
    fn test_merkle_root_commits_to_stored_id() {
        let tx = coinbase("a");
        let mut forged = tx.clone();
        forged.id = Some("00".repeat(32));

        assert_ne!(
            Block::calculate_merkle_root(&[tx]),
            Block::calculate_merkle_root(&[forged])
        );
    }

    #[test]
    fn test_contains_transaction() {
        let tx = coinbase("a");
        let id = tx.id().unwrap().to_string();
        let block = Block::new(0, String::new(), vec![tx]);

        assert!(block.is_genesis());
        assert!(block.contains_transaction(&id));
        assert!(!block.contains_transaction("missing"));
    }
}
