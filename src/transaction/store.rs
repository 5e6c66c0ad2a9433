//! Transaction Store: pending/confirmed lifecycle of transactions and their tags
//!
//! The free functions take a plain `&Connection` so a mining round can run them
//! inside its own SQLite transaction. [`TransactionStore`] wraps them for
//! standalone calls.

use crate::error::{is_unique_violation, EmulatorError, Result};
use crate::persistence::Database;
use crate::schema::{quote, ColumnRegistry, EXTRA_COLUMN_WIDTH};
use crate::transaction::types::{TagRecord, Transaction};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::Arc;
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "id, owner, tags, target, quantity, reward, signature, last_tx, \
     data_size, content_type, format, height, owner_address, data_root, parent, block, created_at";

/// Confirmation state of a stored transaction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed { block_id: String, block_height: u64 },
}

#[derive(Clone)]
pub struct TransactionStore {
    db: Arc<Database>,
}

impl TransactionStore {
    pub fn new(db: Arc<Database>) -> Self {
        TransactionStore { db }
    }

    /// Persists `tx` as pending together with its tag rows.
    ///
    /// Shares the connection lock with mining: a submission that arrives
    /// mid-round waits for that round to commit, then lands as pending for the
    /// next one. It never joins the round already in progress.
    pub fn submit(&self, tx: Transaction) -> Result<Transaction> {
        let stored = self
            .db
            .atomically(|conn| insert(conn, self.db.registry(), tx))?;
        info!(id = %stored.id, tags = stored.tags.len(), "Transaction submitted");
        Ok(stored)
    }

    /// Every pending transaction, in submission order.
    pub fn get_unmined_txs(&self) -> Result<Vec<Transaction>> {
        let conn = self.db.lock()?;
        unmined(&conn)
    }

    /// Stamps every pending transaction with `block_id`, which must already be
    /// stored. Returns the number of transactions confirmed.
    pub fn mine_txs(&self, block_id: &str) -> Result<usize> {
        self.db.atomically(|conn| {
            let height = block_height(conn, block_id)?;
            let stamped = conn.execute(
                "UPDATE transactions SET block = ?1, height = ?2 WHERE block = ''",
                params![block_id, height as i64],
            )?;
            debug!(block_id, stamped, "Pending transactions stamped");
            Ok(stamped)
        })
    }

    pub fn get_by_id(&self, id: &str) -> Result<Transaction> {
        let conn = self.db.lock()?;
        get(&conn, id)
    }

    /// Ids of transactions carrying the decoded tag `name = value`.
    pub fn get_by_tag(&self, name: &str, value: &str) -> Result<Vec<String>> {
        let conn = self.db.lock()?;
        ids_by_tag(&conn, name, value)
    }

    pub fn get_by_owner(&self, owner_address: &str) -> Result<Vec<Transaction>> {
        let conn = self.db.lock()?;
        select_where(&conn, "owner_address = ?1", &[owner_address])
    }

    pub fn get_by_target(&self, target: &str) -> Result<Vec<Transaction>> {
        let conn = self.db.lock()?;
        select_where(&conn, "target = ?1", &[target])
    }

    /// Equality lookup on one of the configured extra columns.
    pub fn get_by_index(&self, column: &str, value: &str) -> Result<Vec<Transaction>> {
        let extra = self.db.registry().find(column).ok_or_else(|| {
            EmulatorError::InvalidInput(format!("'{}' is not an indexed column", column))
        })?;
        let condition = format!("{} = ?1", quote(&extra.column));
        let conn = self.db.lock()?;
        select_where(&conn, &condition, &[value])
    }

    /// Decoded tag rows of one transaction, in submission order.
    pub fn get_tags(&self, tx_id: &str) -> Result<Vec<TagRecord>> {
        let conn = self.db.lock()?;
        tags(&conn, tx_id)
    }

    pub fn status(&self, id: &str) -> Result<TransactionStatus> {
        let tx = self.get_by_id(id)?;
        Ok(match (tx.is_pending(), tx.height) {
            (true, _) => TransactionStatus::Pending,
            (false, Some(block_height)) => TransactionStatus::Confirmed {
                block_id: tx.block,
                block_height,
            },
            (false, None) => {
                let conn = self.db.lock()?;
                let block_height = block_height(&conn, &tx.block)?;
                TransactionStatus::Confirmed {
                    block_id: tx.block,
                    block_height,
                }
            }
        })
    }
}

/// Inserts a pending transaction and its tag rows. Callers wrap this in a
/// database transaction so a failed tag insert leaves nothing behind.
pub fn insert(conn: &Connection, registry: &ColumnRegistry, mut tx: Transaction) -> Result<Transaction> {
    tx.validate()?;
    tx.fill_derived()?;
    tx.block.clear();
    tx.height = None;

    let decoded = tx.decoded_tags()?;
    let tags_json = serde_json::to_string(&tx.tags)?;

    let mut columns = SELECT_COLUMNS.to_string();
    let mut values: Vec<rusqlite::types::Value> = vec![
        tx.id.clone().into(),
        tx.owner.clone().into(),
        tags_json.into(),
        tx.target.clone().into(),
        tx.quantity.clone().into(),
        tx.reward.clone().into(),
        tx.signature.clone().into(),
        tx.last_tx.clone().into(),
        (tx.data_size as i64).into(),
        tx.content_type.clone().into(),
        (tx.format as i64).into(),
        rusqlite::types::Value::Null,
        tx.owner_address.clone().into(),
        tx.data_root.clone().into(),
        tx.parent.clone().into(),
        String::new().into(),
        tx.created_at.to_rfc3339().into(),
    ];
    for extra in registry.columns() {
        let value = decoded
            .iter()
            .find(|(name, _)| extra.matches_tag(name))
            .map(|(_, value)| value.chars().take(EXTRA_COLUMN_WIDTH).collect::<String>());
        columns.push_str(", ");
        columns.push_str(&quote(&extra.column));
        values.push(value.into());
    }
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();

    conn.execute(
        &format!(
            "INSERT INTO transactions ({}) VALUES ({})",
            columns,
            placeholders.join(", ")
        ),
        params_from_iter(values),
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            EmulatorError::DuplicateId(tx.id.clone())
        } else {
            EmulatorError::Database(format!("Failed to insert transaction: {}", e))
        }
    })?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO tags (tx_id, \"index\", name, value) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (index, (name, value)) in decoded.iter().enumerate() {
        stmt.execute(params![tx.id, index as i64, name, value])?;
    }

    Ok(tx)
}

pub fn unmined(conn: &Connection) -> Result<Vec<Transaction>> {
    select_where(conn, "block = ''", &[])
}

/// Stamps exactly the transactions in `ids` with `block_id`. Fails if any of
/// them is missing or already confirmed, so no transaction is mined twice.
pub fn stamp(conn: &Connection, block_id: &str, height: u64, ids: &[String]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "UPDATE transactions SET block = ?1, height = ?2 WHERE id = ?3 AND block = ''",
    )?;
    for id in ids {
        if stmt.execute(params![block_id, height as i64, id])? != 1 {
            return Err(EmulatorError::MiningPersistence(format!(
                "Transaction {} is no longer pending",
                id
            )));
        }
    }
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Transaction> {
    select_where(conn, "id = ?1", &[id])?
        .into_iter()
        .next()
        .ok_or_else(|| EmulatorError::NotFound(format!("Transaction {} not found", id)))
}

pub fn ids_by_tag(conn: &Connection, name: &str, value: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT tx_id FROM tags WHERE name = ?1 AND value = ?2 GROUP BY tx_id ORDER BY MIN(rowid)",
    )?;
    let ids = stmt
        .query_map(params![name, value], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

pub fn tags(conn: &Connection, tx_id: &str) -> Result<Vec<TagRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT tx_id, \"index\", name, value FROM tags WHERE tx_id = ?1 ORDER BY \"index\"",
    )?;
    let rows = stmt
        .query_map([tx_id], |row| {
            Ok(TagRecord {
                tx_id: row.get(0)?,
                index: row.get(1)?,
                name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                value: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn block_height(conn: &Connection, block_id: &str) -> Result<u64> {
    conn.query_row(
        "SELECT height FROM blocks WHERE id = ?1",
        [block_id],
        |row| row.get::<_, i64>(0),
    )
    .optional()?
    .map(|h| h as u64)
    .ok_or_else(|| EmulatorError::NotFound(format!("Block {} not found", block_id)))
}

fn select_where(conn: &Connection, condition: &str, args: &[&str]) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions WHERE {} ORDER BY rowid",
        SELECT_COLUMNS, condition
    ))?;
    let txs = stmt
        .query_map(params_from_iter(args.iter()), from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(txs)
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let tags_json: String = row.get(2)?;
    let tags = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let created_at: String = row.get(16)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(16, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(Transaction {
        id: row.get(0)?,
        owner: text(row, 1)?,
        tags,
        target: text(row, 3)?,
        quantity: text(row, 4)?,
        reward: text(row, 5)?,
        signature: text(row, 6)?,
        last_tx: text(row, 7)?,
        data_size: row.get::<_, Option<i64>>(8)?.unwrap_or(0) as u64,
        content_type: text(row, 9)?,
        format: row.get::<_, Option<i64>>(10)?.unwrap_or(0) as u8,
        height: row.get::<_, Option<i64>>(11)?.map(|h| h as u64),
        owner_address: text(row, 12)?,
        data_root: row.get(13)?,
        parent: row.get(14)?,
        block: row.get(15)?,
        created_at,
    })
}

fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}
