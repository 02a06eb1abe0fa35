//! Command line interface for the ledger node

pub mod commands;
pub mod mining_cli;
pub mod wallet_cli;

pub use commands::run_cli;
