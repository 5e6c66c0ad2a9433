//! LocalWeave - a local emulator of a content-addressed ledger network
//!
//! Clients submit transactions, which wait in a pending pool until a mining
//! round seals all of them into a synthetic block and advances the chain.
//!
//! # Architecture
//!
//! ## Ledger Core
//! - [`schema`] - Table bootstrap and teardown
//! - [`transaction`] - Transaction types and the pending/confirmed store
//! - [`block`] - Blocks and the mining step
//! - [`wallet`] - Address balances
//! - [`chunk`] - Raw data chunks
//! - [`ledger`] - Stores wired to one database, atomic mining rounds
//!
//! ## State Management
//! - [`persistence`] - Shared SQLite handle
//! - [`network`] - Immutable chain counters
//!
//! ## Service
//! - [`node`] - Request-facing holder of the ledger and counters
//! - [`miner`] - Interval auto-mining
//! - [`api`] - HTTP routes
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`encoding`] - base64url and identifier helpers
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger Core
// ============================================================================
pub mod block;
pub mod chunk;
pub mod ledger;
pub mod schema;
pub mod transaction;
pub mod wallet;

// ============================================================================
// State Management
// ============================================================================
pub mod network;
pub mod persistence;

// ============================================================================
// Service
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod miner;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod encoding;
pub mod error;
