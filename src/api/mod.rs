//! REST API over the ledger

pub mod rest;

pub use rest::{create_router, ApiResponse, AppState, RestApi};
