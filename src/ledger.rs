//! Ledger: the stores built on one database plus the boundary operations
//!
//! A [`Ledger`] is constructed once per database and handed to whatever serves
//! requests. It holds no chain counters of its own; [`Ledger::mine_block`] takes
//! the current [`NetworkState`] and returns the next one.

use crate::block::{self, Block, BlockStore};
use crate::chunk::{Chunk, ChunkStore};
use crate::error::{EmulatorError, Result};
use crate::network::{Counters, NetworkState};
use crate::persistence::Database;
use crate::schema::ColumnRegistry;
use crate::transaction::{self, Transaction, TransactionStore};
use crate::wallet::{Wallet, WalletStore};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct Ledger {
    db: Arc<Database>,
    pub transactions: TransactionStore,
    pub blocks: BlockStore,
    pub wallets: WalletStore,
    pub chunks: ChunkStore,
}

impl Ledger {
    pub fn new(db: Arc<Database>) -> Self {
        Ledger {
            transactions: TransactionStore::new(db.clone()),
            blocks: BlockStore::new(db.clone()),
            wallets: WalletStore::new(db.clone()),
            chunks: ChunkStore::new(db.clone()),
            db,
        }
    }

    /// Ledger over a fresh in-memory database.
    pub fn in_memory(registry: ColumnRegistry) -> Result<Self> {
        Ok(Ledger::new(Arc::new(Database::in_memory(registry)?)))
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn submit_transaction(&self, tx: Transaction) -> Result<Transaction> {
        self.transactions.submit(tx)
    }

    pub fn get_transaction(&self, id: &str) -> Result<Transaction> {
        self.transactions.get_by_id(id)
    }

    /// Runs one mining round: read the pending set, seal it into a block on top
    /// of `state.current` at height `state.blocks`, then stamp exactly those
    /// transactions. The round holds the connection lock throughout and commits
    /// as a single SQLite transaction, so on error nothing is written and the
    /// caller may retry with the same state.
    ///
    /// The next counters are computed before anything is written; once the
    /// round commits it cannot fail.
    pub fn mine_block(&self, state: &NetworkState, step: u64) -> Result<NetworkState> {
        let next = state.advanced(state.current.clone(), step)?;
        let extended = Counters::of(&next).to_extended();

        let block = self
            .db
            .atomically(|conn| {
                let pending = transaction::store::unmined(conn)?;
                let block = block::store::seal(
                    conn,
                    state.blocks,
                    &state.current,
                    &pending,
                    Some(extended),
                )?;
                transaction::store::stamp(conn, &block.id, block.height, &block.txs)?;
                Ok(block)
            })
            .map_err(|e| {
                let e = e.into_mining();
                error!(error = %e, height = state.height, "Mining round failed");
                e
            })?;

        info!(
            id = %block.id,
            height = block.height,
            txs = block.txs.len(),
            "Mined block"
        );
        Ok(NetworkState {
            current: block.id,
            ..next
        })
    }

    pub fn get_block(&self, id: &str) -> Result<Block> {
        self.blocks.get_by_id(id)
    }

    pub fn get_wallet(&self, address: &str) -> Result<Wallet> {
        self.wallets.get_by_address(address)
    }

    pub fn get_chunk(&self, id: &str) -> Result<Chunk> {
        self.chunks.get_by_id(id)
    }

    /// Number of transactions waiting for the next round.
    pub fn queue_length(&self) -> Result<usize> {
        Ok(self.transactions.get_unmined_txs()?.len())
    }

    /// Rebuilds the counters from the stored chain, e.g. after reopening a
    /// persistent database. Blocks carry the counters their round produced;
    /// a block without them is taken to have advanced the chain by one.
    pub fn recover_state(&self, network: &str, genesis: &str) -> Result<NetworkState> {
        let state = NetworkState::genesis(network, genesis);
        let latest = match self.blocks.latest()? {
            None => return Ok(state),
            Some(latest) => latest,
        };

        let counters = match latest.extended.as_ref().and_then(Counters::from_extended) {
            Some(counters) => counters,
            None => {
                let next = latest.height.checked_add(1).ok_or_else(|| {
                    EmulatorError::InvalidInput("Chain height overflow".to_string())
                })?;
                Counters {
                    height: next,
                    blocks: next,
                }
            }
        };
        Ok(NetworkState {
            height: counters.height,
            blocks: counters.blocks,
            current: latest.id,
            ..state
        })
    }
}
