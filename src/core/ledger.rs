use crate::core::amount::Amount;
use crate::core::blockchain::{Chain, ChainInfo};
use crate::core::utxo::UnspentRecord;
use crate::core::{Block, Transaction};
use crate::mining::{Miner, MiningStats};
use crate::{InvalidReason, LedgerError, Result};
use std::sync::{Mutex, RwLock};

/// The ledger engine as seen by the outer surfaces. Readers share the chain;
/// mine-and-append cycles run one at a time, and the proof-of-work search
/// happens without holding the chain lock.
pub struct Ledger {
    chain: RwLock<Chain>,
    writer: Mutex<()>,
    miner: Miner,
    block_reward: Amount,
}

impl Ledger {
    pub fn new(chain: Chain, miner: Miner, block_reward: Amount) -> Self {
        Self {
            chain: RwLock::new(chain),
            writer: Mutex::new(()),
            miner,
            block_reward,
        }
    }

    /// Snapshot of every block.
    pub fn get_chain(&self) -> Result<Vec<Block>> {
        Ok(self.chain.read()?.blocks().to_vec())
    }

    pub fn get_block(&self, height: u64) -> Result<Option<Block>> {
        Ok(self.chain.read()?.block(height).cloned())
    }

    pub fn info(&self) -> Result<ChainInfo> {
        Ok(self.chain.read()?.info())
    }

    pub fn mine_empty_block(&self) -> Result<Block> {
        self.append_with(|_| Vec::new())
    }

    /// Mines a block whose only transaction pays the block reward to
    /// `reward_owner`.
    pub fn mine_block(&self, reward_owner: &[u8]) -> Result<Block> {
        let reward = self.block_reward;
        self.append_with(|height| {
            vec![Transaction::new_coinbase(reward_owner.to_vec(), reward, &format!("block {}", height))]
        })
    }

    /// Validates `tx` and includes it in a freshly mined block. Returns its
    /// id once the block is on the chain.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<String> {
        if tx.is_coinbase() {
            return Err(LedgerError::InvalidTransaction(InvalidReason::CoinbaseNotAllowed));
        }

        // Cheap rejection before queueing behind a running miner.
        {
            let chain = self.chain.read()?;
            tx.validate(chain.utxo(), chain.verifier().as_ref())?;
        }

        let txid = tx.id().map(str::to_string).ok_or(InvalidReason::MissingId)?;
        let block = self.append_with(move |_| vec![tx])?;

        log::info!("📨 Transaction {} included in block {}", txid, block.height);
        Ok(txid)
    }

    fn append_with<F>(&self, build: F) -> Result<Block>
    where
        F: FnOnce(u64) -> Vec<Transaction>,
    {
        let _writer = self.writer.lock()?;

        let candidate = {
            let chain = self.chain.read()?;
            chain.prepare_block(build(chain.blocks().len() as u64))?
        };

        let block = self.miner.mine(candidate)?;
        self.chain.write()?.commit_block(block.clone())?;
        Ok(block)
    }

    pub fn balance(&self, owner_hash: &[u8]) -> Result<Amount> {
        Ok(self.chain.read()?.balance_of(owner_hash))
    }

    pub fn utxos(&self, owner_hash: &[u8]) -> Result<Vec<UnspentRecord>> {
        Ok(self.chain.read()?.find_by_owner(owner_hash))
    }

    pub fn validate_chain(&self) -> Result<bool> {
        Ok(self.chain.read()?.validate_chain())
    }

    /// Fail-fast verification that names the first bad height.
    pub fn verify_chain(&self) -> Result<()> {
        self.chain.read()?.verify_chain()
    }

    /// Full replay of the chain into a fresh index. Returns the number of
    /// unspent outputs.
    pub fn rebuild_utxo(&self) -> Result<usize> {
        let _writer = self.writer.lock()?;
        let mut chain = self.chain.write()?;
        chain.rebuild_utxo()?;
        Ok(chain.utxo().len())
    }

    pub fn is_degraded(&self) -> Result<bool> {
        Ok(self.chain.read()?.is_degraded())
    }

    pub fn mining_stats(&self) -> MiningStats {
        self.miner.get_stats()
    }

    pub fn block_reward(&self) -> Amount {
        self.block_reward
    }

    /// Abandons the in-flight search, if any, and refuses further mining.
    pub fn cancel_mining(&self) {
        self.miner.cancel();
    }

    pub fn close(&self) -> Result<()> {
        self.cancel_mining();
        self.chain.read()?.close()
    }
}
