//! Block Store: block creation, chain linkage and the mining step

use crate::block::types::Block;
use crate::error::{is_unique_violation, EmulatorError, Result};
use crate::persistence::Database;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const SELECT_COLUMNS: &str = "id, height, mined_at, previous_block, txs, extended";

#[derive(Clone)]
pub struct BlockStore {
    db: Arc<Database>,
}

impl BlockStore {
    pub fn new(db: Arc<Database>) -> Self {
        BlockStore { db }
    }

    /// Seals `pending` into a new block at height `block_count` on top of
    /// `current_block_id` and returns the new block id. Stamping the
    /// transactions is left to the caller.
    pub fn mine(
        &self,
        block_count: u64,
        current_block_id: &str,
        pending: &[Transaction],
    ) -> Result<String> {
        let conn = self.db.lock()?;
        Ok(mine(&conn, block_count, current_block_id, pending)?.id)
    }

    pub fn insert(&self, block: &Block) -> Result<()> {
        let conn = self.db.lock()?;
        insert(&conn, block)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Block> {
        let conn = self.db.lock()?;
        get(&conn, id)
    }

    pub fn get_by_height(&self, height: u64) -> Result<Block> {
        let conn = self.db.lock()?;
        select_one(&conn, "height = ?1", params![height as i64])?
            .ok_or_else(|| EmulatorError::NotFound(format!("Block at height {} not found", height)))
    }

    /// Highest stored block, if any.
    pub fn latest(&self) -> Result<Option<Block>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM blocks ORDER BY height DESC, rowid DESC LIMIT 1",
            SELECT_COLUMNS
        ))?;
        Ok(stmt.query_row([], from_row).optional()?)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Builds and persists the block for one mining round.
///
/// The height is the caller's running block count; it is not re-derived from
/// storage. Every transaction in `pending` is included, even when that is none.
pub fn mine(
    conn: &Connection,
    block_count: u64,
    current_block_id: &str,
    pending: &[Transaction],
) -> Result<Block> {
    seal(conn, block_count, current_block_id, pending, None)
}

/// Same as [`mine`], attaching `extended` metadata to the stored block.
pub fn seal(
    conn: &Connection,
    block_count: u64,
    current_block_id: &str,
    pending: &[Transaction],
    extended: Option<Value>,
) -> Result<Block> {
    let txs: Vec<String> = pending.iter().map(|tx| tx.id.clone()).collect();
    let mut block = Block::new(block_count, current_block_id, txs);
    block.extended = extended;
    insert(conn, &block)?;
    debug!(id = %block.id, height = block.height, txs = block.txs.len(), "Block persisted");
    Ok(block)
}

pub fn insert(conn: &Connection, block: &Block) -> Result<()> {
    let height = i64::try_from(block.height).map_err(|_| {
        EmulatorError::InvalidInput(format!("Block height {} out of range", block.height))
    })?;
    let txs_json = serde_json::to_string(&block.txs)?;
    let extended_json = block
        .extended
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO blocks (id, height, mined_at, previous_block, txs, extended)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            block.id,
            height,
            block.mined_at.to_rfc3339(),
            block.previous_block,
            txs_json,
            extended_json,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            EmulatorError::DuplicateId(block.id.clone())
        } else {
            EmulatorError::Database(format!("Failed to save block: {}", e))
        }
    })?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Block> {
    select_one(conn, "id = ?1", params![id])?
        .ok_or_else(|| EmulatorError::NotFound(format!("Block {} not found", id)))
}

fn select_one(conn: &Connection, condition: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<Block>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM blocks WHERE {} ORDER BY rowid LIMIT 1",
        SELECT_COLUMNS, condition
    ))?;
    Ok(stmt.query_row(args, from_row).optional()?)
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    let mined_at: String = row.get(2)?;
    let mined_at = DateTime::parse_from_rfc3339(&mined_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    let txs_json: String = row.get(4)?;
    let txs = serde_json::from_str(&txs_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let extended = row
        .get::<_, Option<String>>(5)?
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Block {
        id: row.get(0)?,
        height: row.get::<_, i64>(1)? as u64,
        mined_at,
        previous_block: row.get(3)?,
        txs,
        extended,
    })
}
