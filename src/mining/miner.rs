use crate::core::Block;
use crate::mining::pow::ProofOfWork;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningStats {
    pub is_mining: bool,
    pub difficulty_bits: u32,
    pub threads: usize,
    pub total_hashes: u64,
    pub blocks_mined: u64,
    pub last_block_time: Option<i64>,
    /// Hashes per second over the last mined block.
    pub last_hashrate: f64,
    pub uptime_seconds: u64,
}

/// Runs proof-of-work searches on behalf of the ledger and keeps counters
/// about them. Holds no chain state; the caller hands it a candidate block.
pub struct Miner {
    pow: ProofOfWork,
    threads: usize,
    cancel: AtomicBool,
    is_mining: AtomicBool,
    hash_counter: AtomicU64,
    blocks_mined: AtomicU64,
    last_block: RwLock<Option<(i64, f64)>>,
    start_time: Instant,
}

impl Miner {
    pub fn new(pow: ProofOfWork, threads: usize) -> Self {
        Self {
            pow,
            threads: threads.max(1),
            cancel: AtomicBool::new(false),
            is_mining: AtomicBool::new(false),
            hash_counter: AtomicU64::new(0),
            blocks_mined: AtomicU64::new(0),
            last_block: RwLock::new(None),
            start_time: Instant::now(),
        }
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Abandons the in-flight search and every later one.
    pub fn cancel(&self) {
        log::info!("🛑 Mining cancelled");
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn is_mining(&self) -> bool {
        self.is_mining.load(Ordering::Relaxed)
    }

    /// Finds a nonce for `block` and fills in `nonce` and `hash`.
    pub fn mine(&self, mut block: Block) -> Result<Block> {
        if block.is_mined() {
            return Err(LedgerError::InvalidInput(format!("Block {} is already mined", block.height)));
        }

        log::debug!(
            "⛏️  Mining block {} with {} threads at {} bits",
            block.height,
            self.threads,
            self.pow.difficulty_bits()
        );

        self.is_mining.store(true, Ordering::Relaxed);
        let started = Instant::now();
        let result = self.pow.mine_parallel(&block, self.threads, &self.cancel);
        self.is_mining.store(false, Ordering::Relaxed);

        let outcome = result?;
        let elapsed = started.elapsed().as_secs_f64();
        let hashrate = if elapsed > 0.0 { outcome.attempts as f64 / elapsed } else { 0.0 };

        self.hash_counter.fetch_add(outcome.attempts, Ordering::Relaxed);
        self.blocks_mined.fetch_add(1, Ordering::Relaxed);
        *self.last_block.write()? = Some((chrono::Utc::now().timestamp(), hashrate));

        block.nonce = outcome.nonce;
        block.hash = outcome.hash.to_hex();

        log::info!(
            "🎉 Block {} mined! Nonce: {}, Hash: {} ({} hashes, {:.0} H/s)",
            block.height,
            block.nonce,
            block.hash,
            outcome.attempts,
            hashrate
        );

        Ok(block)
    }

    pub fn get_stats(&self) -> MiningStats {
        let last_block = self.last_block.read().map(|guard| *guard).unwrap_or(None);

        MiningStats {
            is_mining: self.is_mining(),
            difficulty_bits: self.pow.difficulty_bits(),
            threads: self.threads,
            total_hashes: self.hash_counter.load(Ordering::Relaxed),
            blocks_mined: self.blocks_mined.load(Ordering::Relaxed),
            last_block_time: last_block.map(|(time, _)| time),
            last_hashrate: last_block.map(|(_, rate)| rate).unwrap_or(0.0),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}
