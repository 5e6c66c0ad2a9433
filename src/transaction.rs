//! Transaction module split into types and the SQLite-backed store

pub mod store;
pub mod types;

pub use store::{TransactionStatus, TransactionStore};
pub use types::*;
