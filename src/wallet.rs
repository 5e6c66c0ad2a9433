//! Wallet balances keyed by address

use crate::encoding::random_id;
use crate::error::{EmulatorError, Result};
use crate::persistence::Database;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub balance: f64,
}

#[derive(Clone)]
pub struct WalletStore {
    db: Arc<Database>,
}

impl WalletStore {
    pub fn new(db: Arc<Database>) -> Self {
        WalletStore { db }
    }

    pub fn get_by_address(&self, address: &str) -> Result<Wallet> {
        let conn = self.db.lock()?;
        find(&conn, address)?
            .ok_or_else(|| EmulatorError::NotFound(format!("Wallet {} not found", address)))
    }

    /// Sets the balance of `address`, creating the wallet if needed.
    pub fn upsert(&self, address: &str, balance: f64) -> Result<Wallet> {
        check_balance(balance)?;
        self.db.atomically(|conn| match find(conn, address)? {
            Some(mut wallet) => {
                conn.execute(
                    "UPDATE wallets SET balance = ?1 WHERE id = ?2",
                    params![balance, wallet.id],
                )?;
                wallet.balance = balance;
                Ok(wallet)
            }
            None => create(conn, address, balance),
        })
    }

    /// Sets the balance of an existing wallet.
    pub fn update_balance(&self, address: &str, balance: f64) -> Result<Wallet> {
        check_balance(balance)?;
        let conn = self.db.lock()?;
        let updated = conn.execute(
            "UPDATE wallets SET balance = ?1 WHERE address = ?2",
            params![balance, address],
        )?;
        if updated == 0 {
            return Err(EmulatorError::NotFound(format!("Wallet {} not found", address)));
        }
        find(&conn, address)?
            .ok_or_else(|| EmulatorError::NotFound(format!("Wallet {} not found", address)))
    }

    /// Adds `delta` (which may be negative) to the balance of `address`,
    /// creating the wallet with a zero balance first if needed.
    pub fn increment_balance(&self, address: &str, delta: f64) -> Result<Wallet> {
        check_balance(delta.abs())?;
        self.db.atomically(|conn| {
            let mut wallet = match find(conn, address)? {
                Some(wallet) => wallet,
                None => create(conn, address, 0.0)?,
            };
            wallet.balance += delta;
            conn.execute(
                "UPDATE wallets SET balance = ?1 WHERE id = ?2",
                params![wallet.balance, wallet.id],
            )?;
            Ok(wallet)
        })
    }
}

fn check_balance(balance: f64) -> Result<()> {
    if !balance.is_finite() {
        return Err(EmulatorError::InvalidInput(format!(
            "Balance must be a finite number, got {}",
            balance
        )));
    }
    Ok(())
}

fn find(conn: &Connection, address: &str) -> Result<Option<Wallet>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, address, balance FROM wallets WHERE address = ?1 ORDER BY rowid LIMIT 1",
    )?;
    let wallet = stmt
        .query_row([address], |row| {
            Ok(Wallet {
                id: row.get(0)?,
                address: row.get(1)?,
                balance: row.get(2)?,
            })
        })
        .optional()?;
    Ok(wallet)
}

fn create(conn: &Connection, address: &str, balance: f64) -> Result<Wallet> {
    let wallet = Wallet {
        id: random_id(64),
        address: address.to_string(),
        balance,
    };
    conn.execute(
        "INSERT INTO wallets (id, address, balance) VALUES (?1, ?2, ?3)",
        params![wallet.id, wallet.address, wallet.balance],
    )?;
    Ok(wallet)
}
