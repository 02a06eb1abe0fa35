use crate::core::Block;
use crate::crypto::hash::Hash256;
use crate::{LedgerError, Result};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub const DEFAULT_DIFFICULTY_BITS: u32 = 16;

/// A nonce that satisfies the target, with the number of hashes it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningOutcome {
    pub nonce: u64,
    pub hash: Hash256,
    pub attempts: u64,
}

/// Fixed-difficulty proof-of-work: a block hash is admissible when, read as
/// a 256-bit big-endian integer, it is strictly below `2^(256 - bits)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty_bits: u32,
    target: [u8; 32],
}

impl ProofOfWork {
    pub fn new(difficulty_bits: u32) -> Result<Self> {
        if difficulty_bits == 0 || difficulty_bits > 255 {
            return Err(LedgerError::InvalidDifficulty(difficulty_bits));
        }

        Ok(Self {
            difficulty_bits,
            target: target_for(difficulty_bits),
        })
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    pub fn target(&self) -> Hash256 {
        Hash256::new(self.target)
    }

    pub fn meets_target(&self, hash: &Hash256) -> bool {
        hash.as_bytes() < &self.target
    }

    /// SHA-256 of `height ‖ timestamp ‖ merkle root ‖ prev_hash ‖ nonce`,
    /// integers big-endian.
    pub fn hash_block(&self, block: &Block, nonce: u64) -> Hash256 {
        Self::finish(Self::prefix(block), nonce)
    }

    fn prefix(block: &Block) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(block.height.to_be_bytes());
        hasher.update(block.timestamp.to_be_bytes());
        hasher.update(block.merkle_root().as_bytes());
        hasher.update(block.prev_hash.as_bytes());
        hasher
    }

    fn finish(mut hasher: Sha256, nonce: u64) -> Hash256 {
        hasher.update(nonce.to_be_bytes());
        Hash256::new(hasher.finalize().into())
    }

    /// Searches nonces from 0 upward and returns the first one below target.
    /// `cancel` is checked before every attempt.
    pub fn mine(&self, block: &Block, cancel: &AtomicBool) -> Result<MiningOutcome> {
        let prefix = Self::prefix(block);

        for nonce in 0..=u64::MAX {
            if cancel.load(Ordering::Relaxed) {
                return Err(LedgerError::MiningCancelled);
            }

            let hash = Self::finish(prefix.clone(), nonce);
            if self.meets_target(&hash) {
                return Ok(MiningOutcome {
                    nonce,
                    hash,
                    attempts: nonce + 1,
                });
            }
        }

        Err(LedgerError::Internal(format!("Nonce space exhausted for block {}", block.height)))
    }

    /// Same result as [`ProofOfWork::mine`], with nonces striped across
    /// `threads` workers. A worker stops once its next nonce is above the
    /// best nonce found so far, so the lowest winning nonce is always the one
    /// returned.
    pub fn mine_parallel(&self, block: &Block, threads: usize, cancel: &AtomicBool) -> Result<MiningOutcome> {
        if threads <= 1 {
            return self.mine(block, cancel);
        }

        let prefix = Self::prefix(block);
        let best = AtomicU64::new(u64::MAX);
        let attempts = AtomicU64::new(0);

        std::thread::scope(|scope| {
            for worker in 0..threads as u64 {
                let prefix = &prefix;
                let best = &best;
                let attempts = &attempts;

                scope.spawn(move || {
                    let mut nonce = worker;
                    let mut local_attempts = 0u64;

                    while nonce < best.load(Ordering::Acquire) && !cancel.load(Ordering::Relaxed) {
                        local_attempts += 1;
                        if self.meets_target(&Self::finish(prefix.clone(), nonce)) {
                            best.fetch_min(nonce, Ordering::AcqRel);
                            break;
                        }
                        nonce = match nonce.checked_add(threads as u64) {
                            Some(next) => next,
                            None => break,
                        };
                    }

                    attempts.fetch_add(local_attempts, Ordering::Relaxed);
                });
            }
        });

        if cancel.load(Ordering::Relaxed) {
            return Err(LedgerError::MiningCancelled);
        }

        let nonce = best.load(Ordering::Acquire);
        let hash = self.hash_block(block, nonce);
        if !self.meets_target(&hash) {
            return Err(LedgerError::Internal(format!("Nonce space exhausted for block {}", block.height)));
        }

        Ok(MiningOutcome {
            nonce,
            hash,
            attempts: attempts.load(Ordering::Relaxed),
        })
    }

    /// Recomputes the hash for the stored nonce; it must be below target and
    /// equal to the stored hash.
    pub fn validate(&self, block: &Block) -> bool {
        let hash = self.hash_block(block, block.nonce);
        self.meets_target(&hash) && hash.to_hex() == block.hash
    }
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self {
            difficulty_bits: DEFAULT_DIFFICULTY_BITS,
            target: target_for(DEFAULT_DIFFICULTY_BITS),
        }
    }
}

/// Big-endian `2^(256 - bits)`; `bits` must be in `1..=255`.
fn target_for(bits: u32) -> [u8; 32] {
    let position = (256 - bits) as usize;
    let mut target = [0u8; 32];
    target[31 - position / 8] = 1 << (position % 8);
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Amount, Transaction};

    fn candidate() -> Block {
        let coinbase = Transaction::new_coinbase(vec![3u8; 20], Amount::from_coins(50), "pow");
        Block::new(1, "cd".repeat(32), vec![coinbase])
    }

    fn mined(pow: &ProofOfWork) -> Block {
        let mut block = candidate();
        let outcome = pow.mine(&block, &AtomicBool::new(false)).unwrap();
        block.nonce = outcome.nonce;
        block.hash = outcome.hash.to_hex();
        block
    }

    #[test]
    fn test_target_layout() -> Result<()> {
        let pow = ProofOfWork::new(16)?;
        let target = pow.target();
        assert_eq!(target.as_bytes()[1], 1);
        assert!(target.as_bytes().iter().enumerate().all(|(i, b)| i == 1 || *b == 0));

        assert_eq!(ProofOfWork::new(1)?.target().as_bytes()[0], 0x80);
        assert_eq!(ProofOfWork::new(255)?.target().as_bytes()[31], 0x02);
        assert_eq!(ProofOfWork::default(), ProofOfWork::new(DEFAULT_DIFFICULTY_BITS)?);
        Ok(())
    }

    #[test]
    fn test_rejects_out_of_range_difficulty() {
        assert!(matches!(ProofOfWork::new(0), Err(LedgerError::InvalidDifficulty(0))));
        assert!(matches!(ProofOfWork::new(256), Err(LedgerError::InvalidDifficulty(256))));
    }

    #[test]
    fn test_mine_finds_first_valid_nonce() -> Result<()> {
        let pow = ProofOfWork::new(8)?;
        let block = mined(&pow);

        assert!(pow.validate(&block));
        for nonce in 0..block.nonce {
            assert!(!pow.meets_target(&pow.hash_block(&block, nonce)));
        }
        Ok(())
    }

    #[test]
    fn test_parallel_matches_sequential() -> Result<()> {
        let pow = ProofOfWork::new(10)?;
        let block = candidate();
        let cancel = AtomicBool::new(false);

        let sequential = pow.mine(&block, &cancel)?;
        for threads in [2, 3, 8] {
            let parallel = pow.mine_parallel(&block, threads, &cancel)?;
            assert_eq!(parallel.nonce, sequential.nonce);
            assert_eq!(parallel.hash, sequential.hash);
        }
        Ok(())
    }

    #[test]
    fn test_tampering_breaks_validation() -> Result<()> {
        let pow = ProofOfWork::new(8)?;
        let block = mined(&pow);

        let mut bad_nonce = block.clone();
        bad_nonce.nonce += 1;
        assert!(!pow.validate(&bad_nonce));

        let mut bad_prev = block.clone();
        bad_prev.prev_hash.replace_range(0..1, "0");
        assert!(!pow.validate(&bad_prev));

        let mut bad_tx = block.clone();
        bad_tx.transactions[0].outputs[0].value = Amount::from_coins(51);
        assert!(!pow.validate(&bad_tx));

        let mut bad_hash = block.clone();
        bad_hash.hash = "00".repeat(32);
        assert!(!pow.validate(&bad_hash));
        Ok(())
    }

    #[test]
    fn test_cancelled_search() -> Result<()> {
        let pow = ProofOfWork::new(8)?;
        let cancel = AtomicBool::new(true);

        assert!(matches!(pow.mine(&candidate(), &cancel), Err(LedgerError::MiningCancelled)));
        assert!(matches!(pow.mine_parallel(&candidate(), 4, &cancel), Err(LedgerError::MiningCancelled)));
        Ok(())
    }
}
