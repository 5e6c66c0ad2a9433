//! Block model and the Block Store that seals pending transactions

pub mod store;
pub mod types;

pub use store::BlockStore;
pub use types::*;
