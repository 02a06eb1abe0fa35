//! Proof-of-work engine and the miner that drives it

pub mod miner;
pub mod pow;

pub use miner::{Miner, MiningStats};
pub use pow::{MiningOutcome, ProofOfWork, DEFAULT_DIFFICULTY_BITS};
