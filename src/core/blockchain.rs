use crate::core::amount::Amount;
use crate::core::utxo::{PendingView, UnspentRecord, UtxoIndex, UtxoSnapshot};
use crate::core::{Block, Transaction};
use crate::crypto::signatures::SignatureVerifier;
use crate::mining::ProofOfWork;
use crate::storage::{self, BlobStore, MemoryStore, CHAIN_KEY, UTXO_KEY};
use crate::{InvalidReason, LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// What the genesis block pays, and to whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisConfig {
    pub owner_hash: Vec<u8>,
    pub reward: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    pub height: u64,
    pub tip: String,
    pub block_count: usize,
    pub utxo_count: usize,
    pub total_supply: Amount,
    pub difficulty_bits: u32,
    pub degraded: bool,
}

/// The ordered blocks and the UTXO index derived from them.
pub struct Chain {
    blocks: Vec<Block>,
    utxo: UtxoIndex,
    store: Arc<dyn BlobStore>,
    pow: ProofOfWork,
    verifier: Arc<dyn SignatureVerifier>,
    degraded: bool,
}

impl Chain {
    /// Loads the persisted chain from `store`, or creates and persists a
    /// genesis block when there is none. A persisted chain that fails
    /// verification is refused.
    pub fn open(
        store: Arc<dyn BlobStore>,
        pow: ProofOfWork,
        genesis: &GenesisConfig,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self> {
        let blocks: Vec<Block> = storage::get_decoded(store.as_ref(), CHAIN_KEY)?.unwrap_or_default();

        if blocks.is_empty() {
            return Self::create(store, pow, genesis, verifier);
        }

        verify_blocks(&pow, &blocks)?;
        let tip = blocks.last().map(|block| block.hash.clone()).unwrap_or_default();

        let (utxo, rebuilt) = match storage::get_decoded::<UtxoSnapshot>(store.as_ref(), UTXO_KEY) {
            Ok(Some(snapshot)) if !snapshot.records.is_empty() && snapshot.tip == tip => {
                (UtxoIndex::from_snapshot(snapshot), false)
            }
            Ok(Some(snapshot)) if !snapshot.records.is_empty() => {
                log::warn!("⚠️ UTXO snapshot is for tip {}, chain tip is {}; rebuilding", snapshot.tip, tip);
                (UtxoIndex::rebuild(&blocks)?, true)
            }
            Ok(_) => {
                log::warn!("⚠️ UTXO snapshot missing or empty; rebuilding from chain");
                (UtxoIndex::rebuild(&blocks)?, true)
            }
            Err(e) => {
                log::warn!("⚠️ UTXO snapshot unreadable ({}); rebuilding from chain", e);
                (UtxoIndex::rebuild(&blocks)?, true)
            }
        };

        let chain = Self {
            blocks,
            utxo,
            store,
            pow,
            verifier,
            degraded: false,
        };
        if rebuilt {
            chain.save_utxo()?;
        }

        log::info!("📦 Loaded chain at height {} (tip {})", chain.height(), chain.tip_hash());
        Ok(chain)
    }

    fn create(
        store: Arc<dyn BlobStore>,
        pow: ProofOfWork,
        genesis: &GenesisConfig,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self> {
        let block = Self::genesis_block(&pow, genesis);
        let utxo = UtxoIndex::rebuild(std::slice::from_ref(&block))?;

        log::info!("🌱 Created genesis block {}", block.hash);

        let chain = Self {
            blocks: vec![block],
            utxo,
            store,
            pow,
            verifier,
            degraded: false,
        };
        chain.persist()?;
        Ok(chain)
    }

    /// Single coinbase, hashed directly without a nonce search.
    pub fn genesis_block(pow: &ProofOfWork, genesis: &GenesisConfig) -> Block {
        let coinbase = Transaction::new_coinbase(genesis.owner_hash.clone(), genesis.reward, "genesis");
        let mut block = Block::new(0, String::new(), vec![coinbase]);
        block.hash = pow.hash_block(&block, block.nonce).to_hex();
        block
    }

    /// Loads and verifies the chain in `store` without opening it. Returns
    /// the number of blocks.
    pub fn verify_stored(store: &dyn BlobStore, pow: &ProofOfWork) -> Result<usize> {
        let blocks: Vec<Block> = storage::get_decoded(store, CHAIN_KEY)?
            .ok_or_else(|| LedgerError::Persistence("No chain has been persisted".to_string()))?;
        verify_blocks(pow, &blocks)?;
        Ok(blocks.len())
    }

    /// Validates `transactions` as one pending set against the current index
    /// and builds the candidate block on top of the tip. Nothing is mutated.
    pub fn prepare_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        let mut view = PendingView::new(&self.utxo);
        let mut coinbase_seen = false;

        for tx in &transactions {
            if tx.is_coinbase() {
                if coinbase_seen {
                    return Err(LedgerError::InvalidTransaction(InvalidReason::CoinbaseNotAllowed));
                }
                coinbase_seen = true;
            }

            if let Err(reason) = tx.validate(&view, self.verifier.as_ref()) {
                log::warn!("❌ Rejected transaction {}: {}", tx.id().unwrap_or("<no id>"), reason);
                return Err(LedgerError::InvalidTransaction(reason));
            }
            view.stage(tx);
        }

        Ok(Block::new(self.blocks.len() as u64, self.tip_hash(), transactions))
    }

    /// Appends a mined block produced by [`Chain::prepare_block`]: checks its
    /// linkage and proof of work, applies it to the index, and persists both.
    /// On any error the chain and index are left as they were.
    pub fn commit_block(&mut self, block: Block) -> Result<()> {
        let expected_height = self.blocks.len() as u64;
        if block.height != expected_height || block.prev_hash != self.tip_hash() {
            return Err(LedgerError::ConsensusViolation {
                height: block.height,
                reason: format!("block does not extend tip at height {}", self.height()),
            });
        }
        if !self.pow.validate(&block) {
            return Err(LedgerError::ConsensusViolation {
                height: block.height,
                reason: "invalid proof of work".to_string(),
            });
        }

        if let Err(e) = self.utxo.apply(&block) {
            log::error!("🚨 UTXO index rejected block {}: {}", block.height, e);
            if matches!(e, LedgerError::UtxoConsistency { .. }) {
                self.rebuild_utxo()?;
            }
            return Err(e);
        }
        self.blocks.push(block);

        if let Err(e) = self.persist() {
            self.blocks.pop();
            self.utxo = UtxoIndex::rebuild(&self.blocks)?;
            self.enter_degraded_mode(&e);
            return Err(e);
        }

        log::info!("✅ Block {} added to chain ({})", self.height(), self.tip_hash());
        Ok(())
    }

    /// Builds, mines and commits a block in one call.
    pub fn append_block(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        let mut block = self.prepare_block(transactions)?;
        let outcome = self.pow.mine(&block, &AtomicBool::new(false))?;
        block.nonce = outcome.nonce;
        block.hash = outcome.hash.to_hex();

        self.commit_block(block.clone())?;
        Ok(block)
    }

    pub fn validate_chain(&self) -> bool {
        self.verify_chain().is_ok()
    }

    /// Fail-fast verification; the error names the first bad height.
    pub fn verify_chain(&self) -> Result<()> {
        verify_blocks(&self.pow, &self.blocks)
    }

    /// Replaces the index with a full replay of the chain.
    pub fn rebuild_utxo(&mut self) -> Result<()> {
        self.utxo = UtxoIndex::rebuild(&self.blocks)?;
        if let Err(e) = self.save_utxo() {
            self.enter_degraded_mode(&e);
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        storage::put_encoded(self.store.as_ref(), CHAIN_KEY, &self.blocks)?;
        self.save_utxo()
    }

    fn save_utxo(&self) -> Result<()> {
        storage::put_encoded(self.store.as_ref(), UTXO_KEY, &self.utxo.to_snapshot(&self.tip_hash()))
    }

    fn enter_degraded_mode(&mut self, cause: &LedgerError) {
        log::warn!("⚠️ Persistence failed ({}); continuing with an in-memory store", cause);
        self.store = Arc::new(MemoryStore::new());
        self.degraded = true;
        if let Err(e) = self.persist() {
            log::error!("🚨 In-memory store rejected chain: {}", e);
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, height: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(height).ok()?)
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn tip_hash(&self) -> String {
        self.tip().map(|block| block.hash.clone()).unwrap_or_default()
    }

    pub fn height(&self) -> u64 {
        self.blocks.len().saturating_sub(1) as u64
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn verifier(&self) -> Arc<dyn SignatureVerifier> {
        self.verifier.clone()
    }

    pub fn utxo(&self) -> &UtxoIndex {
        &self.utxo
    }

    pub fn balance_of(&self, owner_hash: &[u8]) -> Amount {
        self.utxo.balance_of(owner_hash)
    }

    pub fn find_by_owner(&self, owner_hash: &[u8]) -> Vec<UnspentRecord> {
        self.utxo.find_by_owner(owner_hash)
    }

    pub fn info(&self) -> ChainInfo {
        ChainInfo {
            height: self.height(),
            tip: self.tip_hash(),
            block_count: self.blocks.len(),
            utxo_count: self.utxo.len(),
            total_supply: self.utxo.total_value(),
            difficulty_bits: self.pow.difficulty_bits(),
            degraded: self.degraded,
        }
    }
}

fn verify_blocks(pow: &ProofOfWork, blocks: &[Block]) -> Result<()> {
    let mut previous: Option<&Block> = None;

    for (index, block) in blocks.iter().enumerate() {
        let height = index as u64;
        let violation = |reason: String| {
            log::error!("🚨 Chain validation failed at height {}: {}", height, reason);
            LedgerError::ConsensusViolation { height, reason }
        };

        if block.height != height {
            return Err(violation(format!("stored height is {}", block.height)));
        }

        let coinbases = block.transactions.iter().filter(|tx| tx.is_coinbase()).count();
        if coinbases > 1 {
            return Err(violation(format!("block carries {} coinbase transactions", coinbases)));
        }
        let mut ids = HashSet::new();
        if !block.transactions.iter().all(|tx| ids.insert(tx.id())) {
            return Err(violation("block repeats a transaction".to_string()));
        }

        match previous {
            None => {
                if !block.prev_hash.is_empty() {
                    return Err(violation("genesis block has a previous hash".to_string()));
                }
                if pow.hash_block(block, block.nonce).to_hex() != block.hash {
                    return Err(violation("hash does not match contents".to_string()));
                }
            }
            Some(prev) => {
                if block.prev_hash != prev.hash {
                    return Err(violation("previous hash does not match".to_string()));
                }
                if !pow.validate(block) {
                    return Err(violation("invalid proof of work".to_string()));
                }
            }
        }

        previous = Some(block);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OutPoint, TxInput, TxOutput};
    use crate::crypto::keys::KeyPair;
    use crate::crypto::signatures::Secp256k1Verifier;
    use crate::storage::Database;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn pow() -> ProofOfWork {
        ProofOfWork::new(8).unwrap()
    }

    fn genesis_for(owner: &KeyPair) -> GenesisConfig {
        GenesisConfig {
            owner_hash: owner.owner_hash().to_vec(),
            reward: Amount::from_coins(50),
        }
    }

    fn open(store: Arc<dyn BlobStore>, owner: &KeyPair) -> Result<Chain> {
        Chain::open(store, pow(), &genesis_for(owner), Arc::new(Secp256k1Verifier::new()))
    }

    fn transfer(from: &KeyPair, spend: OutPoint, outputs: Vec<(&KeyPair, u64)>) -> Transaction {
        let outputs = outputs
            .into_iter()
            .map(|(to, coins)| TxOutput::new(Amount::from_coins(coins), &to.owner_hash()))
            .collect();
        let mut tx = Transaction::new(vec![TxInput::spending(spend.txid, spend.index).unwrap()], outputs);
        tx.sign_all(from).unwrap();
        tx.set_id().unwrap();
        tx
    }

    fn genesis_outpoint(chain: &Chain) -> OutPoint {
        OutPoint::new(chain.blocks()[0].transactions[0].id().unwrap(), 0)
    }

    /// Passes writes through until `fail` is set.
    struct FlakyStore {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    impl BlobStore for FlakyStore {
        fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(LedgerError::Persistence("disk full".to_string()));
            }
            self.inner.put(key, bytes)
        }

        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn close(&self) -> Result<()> {
            self.inner.close()
        }
    }

    #[test]
    fn test_genesis_creation() -> Result<()> {
        let alice = KeyPair::new()?;
        let chain = open(Arc::new(MemoryStore::new()), &alice)?;

        assert_eq!(chain.height(), 0);
        assert!(chain.blocks()[0].prev_hash.is_empty());
        assert!(chain.validate_chain());
        assert_eq!(chain.balance_of(alice.owner_hash().as_bytes()), Amount::from_coins(50));
        Ok(())
    }

    #[test]
    fn test_spend_scenario() -> Result<()> {
        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;
        let genesis_out = genesis_outpoint(&chain);

        let tx = transfer(&alice, genesis_out.clone(), vec![(&bob, 30), (&alice, 20)]);
        let block = chain.append_block(vec![tx])?;

        assert_eq!(block.height, 1);
        assert_eq!(chain.balance_of(alice.owner_hash().as_bytes()), Amount::from_coins(20));
        assert_eq!(chain.balance_of(bob.owner_hash().as_bytes()), Amount::from_coins(30));
        assert!(chain
            .find_by_owner(alice.owner_hash().as_bytes())
            .iter()
            .all(|record| record.outpoint() != genesis_out));
        assert!(chain.validate_chain());
        Ok(())
    }

    #[test]
    fn test_coinbase_grants_accumulate() -> Result<()> {
        let alice = KeyPair::new()?;
        let miner = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;

        for height in 1..=3u64 {
            let coinbase = Transaction::new_coinbase(
                miner.owner_hash().to_vec(),
                Amount::from_coins(height),
                &format!("block {}", height),
            );
            chain.append_block(vec![coinbase])?;
        }

        assert_eq!(chain.balance_of(miner.owner_hash().as_bytes()), Amount::from_coins(6));
        assert_eq!(chain.info().total_supply, Amount::from_coins(56));
        Ok(())
    }

    #[test]
    fn test_double_spend_in_pending_set_rejected() -> Result<()> {
        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let carol = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;
        let genesis_out = genesis_outpoint(&chain);

        let first = transfer(&alice, genesis_out.clone(), vec![(&bob, 50)]);
        let second = transfer(&alice, genesis_out, vec![(&carol, 50)]);

        let result = chain.append_block(vec![first, second]);
        assert!(matches!(
            result,
            Err(LedgerError::InvalidTransaction(InvalidReason::DoubleSpend { .. }))
        ));
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.balance_of(alice.owner_hash().as_bytes()), Amount::from_coins(50));
        Ok(())
    }

    #[test]
    fn test_spend_across_blocks_is_rejected_once_consumed() -> Result<()> {
        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;
        let genesis_out = genesis_outpoint(&chain);

        chain.append_block(vec![transfer(&alice, genesis_out.clone(), vec![(&bob, 50)])])?;
        let replay = transfer(&alice, genesis_out, vec![(&alice, 50)]);

        assert!(matches!(
            chain.append_block(vec![replay]),
            Err(LedgerError::InvalidTransaction(InvalidReason::UnresolvedInput { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_chained_spend_within_one_block() -> Result<()> {
        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;

        let first = transfer(&alice, genesis_outpoint(&chain), vec![(&bob, 50)]);
        let second = transfer(&bob, OutPoint::new(first.id().unwrap(), 0), vec![(&alice, 50)]);
        chain.append_block(vec![first, second])?;

        assert_eq!(chain.balance_of(alice.owner_hash().as_bytes()), Amount::from_coins(50));
        assert_eq!(chain.balance_of(bob.owner_hash().as_bytes()), Amount::ZERO);
        Ok(())
    }

    #[test]
    fn test_second_coinbase_rejected() -> Result<()> {
        let alice = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;
        let owner = alice.owner_hash().to_vec();

        let result = chain.append_block(vec![
            Transaction::new_coinbase(owner.clone(), Amount::from_coins(1), "a"),
            Transaction::new_coinbase(owner, Amount::from_coins(1), "b"),
        ]);
        assert!(matches!(
            result,
            Err(LedgerError::InvalidTransaction(InvalidReason::CoinbaseNotAllowed))
        ));
        Ok(())
    }

    #[test]
    fn test_rebuild_matches_incremental_index() -> Result<()> {
        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;

        let tx = transfer(&alice, genesis_outpoint(&chain), vec![(&bob, 30), (&alice, 20)]);
        let change = OutPoint::new(tx.id().unwrap(), 1);
        chain.append_block(vec![tx])?;
        chain.append_block(vec![])?;
        chain.append_block(vec![transfer(&alice, change, vec![(&bob, 5), (&alice, 15)])])?;

        assert_eq!(&UtxoIndex::rebuild(chain.blocks())?, chain.utxo());
        Ok(())
    }

    #[test]
    fn test_persisted_chain_reopens() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let path = temp_dir.path().join("ledger.db");

        let (tip, utxo) = {
            let store: Arc<dyn BlobStore> = Arc::new(Database::new(&path)?);
            let mut chain = open(store, &alice)?;
            chain.append_block(vec![transfer(&alice, genesis_outpoint(&chain), vec![(&bob, 50)])])?;
            chain.close()?;
            (chain.tip_hash(), chain.utxo().clone())
        };

        let store: Arc<dyn BlobStore> = Arc::new(Database::new(&path)?);
        let chain = open(store, &alice)?;
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.tip_hash(), tip);
        assert_eq!(chain.utxo(), &utxo);
        Ok(())
    }

    #[test]
    fn test_missing_or_stale_snapshot_is_rebuilt() -> Result<()> {
        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let store = Arc::new(MemoryStore::new());

        let (stale, expected) = {
            let mut chain = open(store.clone(), &alice)?;
            let stale = chain.utxo().to_snapshot(&chain.tip_hash());
            chain.append_block(vec![transfer(&alice, genesis_outpoint(&chain), vec![(&bob, 50)])])?;
            (stale, chain.utxo().clone())
        };

        storage::put_encoded(store.as_ref(), UTXO_KEY, &UtxoSnapshot::default())?;
        let chain = open(store.clone(), &alice)?;
        assert_eq!(chain.utxo(), &expected);

        storage::put_encoded(store.as_ref(), UTXO_KEY, &stale)?;
        let chain = open(store, &alice)?;
        assert_eq!(chain.utxo(), &expected);
        Ok(())
    }

    #[test]
    fn test_tampered_hash_reports_height() -> Result<()> {
        let alice = KeyPair::new()?;
        let store = Arc::new(MemoryStore::new());
        {
            let mut chain = open(store.clone(), &alice)?;
            for _ in 0..3 {
                chain.append_block(vec![])?;
            }
        }

        let mut blocks: Vec<Block> = storage::get_decoded(store.as_ref(), CHAIN_KEY)?.unwrap();
        blocks[2].hash = "00".repeat(32);
        storage::put_encoded(store.as_ref(), CHAIN_KEY, &blocks)?;

        assert!(matches!(
            Chain::verify_stored(store.as_ref(), &pow()),
            Err(LedgerError::ConsensusViolation { height: 2, .. })
        ));
        assert!(matches!(
            open(store, &alice),
            Err(LedgerError::ConsensusViolation { height: 2, .. })
        ));
        Ok(())
    }

    fn remine(block: &mut Block) -> Result<()> {
        let outcome = pow().mine(block, &AtomicBool::new(false))?;
        block.nonce = outcome.nonce;
        block.hash = outcome.hash.to_hex();
        Ok(())
    }

    #[test]
    fn test_repeated_transaction_in_stored_block_is_rejected() -> Result<()> {
        let alice = KeyPair::new()?;
        let bob = KeyPair::new()?;
        let store = Arc::new(MemoryStore::new());
        {
            let store: Arc<dyn BlobStore> = store.clone();
            let mut chain = open(store, &alice)?;
            let spend = transfer(&alice, genesis_outpoint(&chain), vec![(&bob, 30), (&alice, 20)]);
            let reward = Transaction::new_coinbase(bob.owner_hash().to_vec(), Amount::from_coins(50), "block 1");
            chain.append_block(vec![spend, reward])?;
            chain.append_block(vec![])?;
        }

        let mut blocks: Vec<Block> = storage::get_decoded(store.as_ref(), CHAIN_KEY)?.unwrap();
        let repeated = blocks[1].transactions[1].clone();
        blocks[1].transactions.push(repeated);
        storage::put_encoded(store.as_ref(), CHAIN_KEY, &blocks)?;

        assert!(matches!(
            Chain::verify_stored(store.as_ref(), &pow()),
            Err(LedgerError::ConsensusViolation { height: 1, .. })
        ));
        assert!(matches!(
            open(store.clone(), &alice),
            Err(LedgerError::ConsensusViolation { height: 1, .. })
        ));

        // Still refused when the tampered block carries a valid proof of work.
        remine(&mut blocks[1])?;
        assert!(pow().validate(&blocks[1]));
        assert!(matches!(
            verify_blocks(&pow(), &blocks[..2]),
            Err(LedgerError::ConsensusViolation { height: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_broken_link_reports_height() -> Result<()> {
        let alice = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;
        for _ in 0..3 {
            chain.append_block(vec![])?;
        }

        chain.blocks[2].prev_hash = "ab".repeat(32);
        remine(&mut chain.blocks[2])?;
        assert!(chain.pow().validate(&chain.blocks[2]));

        match chain.verify_chain() {
            Err(LedgerError::ConsensusViolation { height, reason }) => {
                assert_eq!(height, 2);
                assert!(reason.contains("previous hash"));
            }
            other => panic!("expected a linkage violation, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_in_memory_tamper_fails_validation() -> Result<()> {
        let alice = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;
        chain.append_block(vec![])?;
        chain.append_block(vec![])?;

        chain.blocks[1].nonce += 1;
        assert!(!chain.validate_chain());
        assert!(matches!(
            chain.verify_chain(),
            Err(LedgerError::ConsensusViolation { height: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_commit_rejects_unmined_and_stale_blocks() -> Result<()> {
        let alice = KeyPair::new()?;
        let mut chain = open(Arc::new(MemoryStore::new()), &alice)?;

        let candidate = chain.prepare_block(vec![])?;
        assert!(matches!(
            chain.commit_block(candidate.clone()),
            Err(LedgerError::ConsensusViolation { height: 1, .. })
        ));

        chain.append_block(vec![])?;
        let mut stale = candidate;
        let outcome = pow().mine(&stale, &AtomicBool::new(false))?;
        stale.nonce = outcome.nonce;
        stale.hash = outcome.hash.to_hex();
        assert!(matches!(
            chain.commit_block(stale),
            Err(LedgerError::ConsensusViolation { .. })
        ));
        assert_eq!(chain.height(), 1);
        Ok(())
    }

    #[test]
    fn test_persistence_failure_enters_degraded_mode() -> Result<()> {
        let alice = KeyPair::new()?;
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail: AtomicBool::new(false),
        });
        let mut chain = open(store.clone(), &alice)?;

        store.fail.store(true, Ordering::Relaxed);
        assert!(matches!(chain.append_block(vec![]), Err(LedgerError::Persistence(_))));
        assert!(chain.is_degraded());
        assert_eq!(chain.height(), 0);

        // Later appends land in memory.
        chain.append_block(vec![])?;
        assert_eq!(chain.height(), 1);
        assert!(chain.validate_chain());
        Ok(())
    }
}
