//! Shared SQLite handle for the ledger stores

use crate::error::{EmulatorError, Result};
use crate::schema::{self, ColumnRegistry};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// One SQLite connection shared by every store built on it.
///
/// The mutex doubles as the store-level exclusive section: a mining round holds
/// the guard from reading the pending set until its database transaction commits.
pub struct Database {
    conn: Mutex<Connection>,
    registry: ColumnRegistry,
    path: String,
}

impl Database {
    /// Opens (or creates) the database at `path` without touching its schema.
    pub fn open(path: &str, registry: ColumnRegistry) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| EmulatorError::Database(format!("Failed to open database: {}", e)))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(Database {
            conn: Mutex::new(conn),
            registry,
            path: path.to_string(),
        })
    }

    /// In-memory database with a freshly bootstrapped schema.
    pub fn in_memory(registry: ColumnRegistry) -> Result<Self> {
        let db = Database::open(":memory:", registry)?;
        db.initialize()?;
        Ok(db)
    }

    pub fn initialize(&self) -> Result<()> {
        let mut conn = self.lock()?;
        schema::initialize(&mut conn, &self.registry)
    }

    pub fn teardown(&self, environment: &str, persist: bool) -> Result<bool> {
        let conn = self.lock()?;
        schema::teardown(&conn, environment, persist)
    }

    /// True when all five ledger tables exist.
    pub fn has_schema(&self) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )?;
        for table in schema::TABLES {
            let count: i64 = stmt.query_row([table], |row| row.get(0))?;
            if count == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EmulatorError::Database("Mutex poisoned".to_string()))
    }

    /// Runs `f` inside one SQLite transaction while holding the connection lock.
    /// Nothing `f` wrote survives if it returns an error.
    pub(crate) fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| {
            EmulatorError::Database(format!("Failed to start transaction: {}", e))
        })?;
        let value = f(&tx)?;
        tx.commit().map_err(|e| {
            EmulatorError::Database(format!("Failed to commit transaction: {}", e))
        })?;
        Ok(value)
    }
}
