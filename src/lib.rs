//! pow-ledger - a single-node proof-of-work ledger
//!
//! This library implements:
//! - Hash-linked blocks admitted by a fixed-difficulty SHA-256 proof of work
//! - A UTXO index maintained incrementally and rebuildable from the chain
//! - secp256k1-signed transactions validated against that index
//! - sled-backed snapshot persistence
//! - A REST API and a CLI on top of the `Ledger` service

pub mod core;
pub mod crypto;
pub mod wallet;
pub mod mining;
pub mod storage;
pub mod cli;
pub mod api;
pub mod error;
pub mod config;

pub use error::{InvalidReason, LedgerError, Result};
