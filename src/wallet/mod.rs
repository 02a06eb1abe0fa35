//! Named key pairs that sign transfers

pub mod wallet;

pub use wallet::{Wallet, WalletInfo, WalletRecord, WalletStore};
