use crate::core::Amount;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Consensus violation at height {height}: {reason}")]
    ConsensusViolation { height: u64, reason: String },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] InvalidReason),

    #[error("UTXO index inconsistency at output {txid}:{index}: {reason}")]
    UtxoConsistency { txid: String, index: u32, reason: String },

    #[error("Mining cancelled")]
    MiningCancelled,

    #[error("Invalid difficulty: {0} bits (expected 1..=255)")]
    InvalidDifficulty(u32),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a transaction was refused at the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("insufficient funds: inputs {available}, outputs {required}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("input {input} references unknown or spent output {txid}:{index}")]
    UnresolvedInput { input: usize, txid: String, index: i32 },

    #[error("input {input} has an invalid signature")]
    BadSignature { input: usize },

    #[error("input {input} is signed by a key that does not own the spent output")]
    OwnerMismatch { input: usize },

    #[error("coinbase transaction must have exactly one output, found {outputs}")]
    MalformedCoinbase { outputs: usize },

    #[error("coinbase transactions cannot be submitted")]
    CoinbaseNotAllowed,

    #[error("output {txid}:{index} is spent more than once")]
    DoubleSpend { txid: String, index: i32 },

    #[error("transaction has no inputs")]
    MissingInputs,

    #[error("transaction has no outputs")]
    MissingOutputs,

    #[error("transaction id has not been assigned")]
    MissingId,

    #[error("transaction id {claimed} does not match content hash {computed}")]
    IdMismatch { claimed: String, computed: String },

    #[error("value overflow while summing amounts")]
    ValueOverflow,
}

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        LedgerError::Internal(format!("lock poisoned: {}", err))
    }
}
