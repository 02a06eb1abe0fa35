//! Core ledger components

pub mod amount;
pub mod block;
pub mod blockchain;
pub mod ledger;
pub mod transaction;
pub mod utxo;

pub use amount::{Amount, COIN};
pub use block::Block;
pub use blockchain::{Chain, ChainInfo, GenesisConfig};
pub use ledger::Ledger;
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput};
pub use utxo::{PendingView, UnspentRecord, UtxoIndex, UtxoLookup, UtxoSnapshot};
