//! Schema bootstrap for the five ledger tables
//!
//! `initialize` is destructive: it drops `transactions`, `blocks`, `tags`,
//! `wallets` and `chunks` before recreating them, so calling it twice yields the
//! same empty schema. `teardown` only drops tables for ephemeral environments.
//!
//! SQLite implements every index as a B-tree. [`IndexKind`] still records the
//! intended access pattern so the index plan stays explicit.

use crate::error::{EmulatorError, Result};
use rusqlite::Connection;
use tracing::{debug, info};

pub const TABLES: [&str; 5] = ["transactions", "blocks", "tags", "wallets", "chunks"];

/// Columns of `transactions` that configured extra columns may not shadow.
pub const TRANSACTION_COLUMNS: [&str; 17] = [
    "id",
    "owner",
    "tags",
    "target",
    "quantity",
    "reward",
    "signature",
    "last_tx",
    "data_size",
    "content_type",
    "format",
    "height",
    "owner_address",
    "data_root",
    "parent",
    "block",
    "created_at",
];

/// Width of the text stored in configured extra columns.
pub const EXTRA_COLUMN_WIDTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Hash,
    BTree,
}

/// An extra indexed column on `transactions`, filled from the tag of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraColumn {
    /// Name as configured, e.g. `App-Name`.
    pub source: String,
    /// SQL column name, e.g. `App_Name`.
    pub column: String,
    pub kind: IndexKind,
}

impl ExtraColumn {
    /// True when a tag called `tag_name` feeds this column.
    pub fn matches_tag(&self, tag_name: &str) -> bool {
        self.source.eq_ignore_ascii_case(tag_name)
            || self.column.eq_ignore_ascii_case(&tag_name.replace('-', "_"))
    }
}

/// Extra `transactions` columns, resolved once at bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnRegistry {
    columns: Vec<ExtraColumn>,
}

impl ColumnRegistry {
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, IndexKind)>,
        S: Into<String>,
    {
        let mut columns: Vec<ExtraColumn> = Vec::new();
        for (source, kind) in entries {
            let source = source.into();
            let column = source.trim().replace('-', "_");
            if !is_identifier(&column) {
                return Err(EmulatorError::SchemaBootstrap(format!(
                    "'{}' is not a valid column name",
                    source
                )));
            }
            if TRANSACTION_COLUMNS
                .iter()
                .any(|base| base.eq_ignore_ascii_case(&column))
            {
                return Err(EmulatorError::SchemaBootstrap(format!(
                    "'{}' collides with a built-in transaction column",
                    source
                )));
            }
            if columns.iter().any(|c| c.column.eq_ignore_ascii_case(&column)) {
                return Err(EmulatorError::SchemaBootstrap(format!(
                    "'{}' is configured more than once",
                    source
                )));
            }
            columns.push(ExtraColumn { source, column, kind });
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ExtraColumn] {
        &self.columns
    }

    /// Looks a column up by configured or SQL name.
    pub fn find(&self, name: &str) -> Option<&ExtraColumn> {
        self.columns.iter().find(|c| c.matches_tag(name))
    }
}

/// One planned index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub table: &'static str,
    pub columns: Vec<String>,
    pub kind: IndexKind,
}

/// Every secondary index created by [`initialize`].
pub fn index_plan(registry: &ColumnRegistry) -> Vec<IndexSpec> {
    let mut plan: Vec<IndexSpec> = registry
        .columns()
        .iter()
        .map(|c| IndexSpec {
            name: format!("index_{}_transactions", c.column),
            table: "transactions",
            columns: vec![c.column.clone()],
            kind: c.kind,
        })
        .collect();

    let fixed: [(&str, &'static str, &[&str], IndexKind); 7] = [
        ("transactions_height", "transactions", &["height"], IndexKind::Hash),
        ("transactions_owner_address", "transactions", &["owner_address"], IndexKind::Hash),
        ("transactions_target", "transactions", &["target"], IndexKind::Hash),
        ("blocks_height", "blocks", &["height"], IndexKind::Hash),
        ("tags_tx_id_name", "tags", &["tx_id", "name"], IndexKind::BTree),
        ("tags_name", "tags", &["name"], IndexKind::Hash),
        ("tags_name_value", "tags", &["name", "value"], IndexKind::BTree),
    ];
    plan.extend(fixed.iter().map(|(name, table, columns, kind)| IndexSpec {
        name: name.to_string(),
        table: *table,
        columns: columns.iter().map(|c| c.to_string()).collect(),
        kind: *kind,
    }));
    plan
}

/// Drops and recreates the five ledger tables with their indices.
pub fn initialize(conn: &mut Connection, registry: &ColumnRegistry) -> Result<()> {
    let ddl = bootstrap_sql(registry);
    let tx = conn
        .transaction()
        .map_err(|e| EmulatorError::SchemaBootstrap(format!("Failed to start transaction: {}", e)))?;
    tx.execute_batch(&ddl)
        .map_err(|e| EmulatorError::SchemaBootstrap(format!("Failed to create schema: {}", e)))?;
    tx.commit()
        .map_err(|e| EmulatorError::SchemaBootstrap(format!("Failed to commit schema: {}", e)))?;

    info!(
        extra_columns = registry.columns().len(),
        "Schema initialized"
    );
    Ok(())
}

/// Drops the five tables in `environment`, but only when `persist` is false.
/// Returns whether anything was dropped.
pub fn teardown(conn: &Connection, environment: &str, persist: bool) -> Result<bool> {
    if persist {
        debug!(environment, "Teardown skipped for persistent environment");
        return Ok(false);
    }
    if !is_identifier(environment) {
        return Err(EmulatorError::InvalidInput(format!(
            "'{}' is not a valid schema name",
            environment
        )));
    }

    let ddl: String = TABLES
        .iter()
        .map(|table| format!("DROP TABLE IF EXISTS {}.{};\n", quote(environment), table))
        .collect();
    conn.execute_batch(&ddl)?;

    info!(environment, "Schema torn down");
    Ok(true)
}

fn bootstrap_sql(registry: &ColumnRegistry) -> String {
    let mut sql: String = TABLES
        .iter()
        .map(|table| format!("DROP TABLE IF EXISTS {};\n", table))
        .collect();

    let extra_columns: String = registry
        .columns()
        .iter()
        .map(|c| format!(",\n    {} TEXT", quote(&c.column)))
        .collect();

    sql.push_str(&format!(
        "CREATE TABLE transactions (
    id TEXT NOT NULL,
    owner TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    target TEXT,
    quantity TEXT,
    reward TEXT,
    signature TEXT,
    last_tx TEXT,
    data_size INTEGER,
    content_type TEXT,
    format INTEGER,
    height INTEGER,
    owner_address TEXT,
    data_root TEXT,
    parent TEXT,
    block TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL{},
    CONSTRAINT pkey_transactions PRIMARY KEY (id)
);
CREATE TABLE blocks (
    id TEXT NOT NULL,
    height INTEGER NOT NULL,
    mined_at TEXT NOT NULL,
    previous_block TEXT NOT NULL,
    txs TEXT NOT NULL,
    extended TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    CONSTRAINT pkey_blocks PRIMARY KEY (id)
);
CREATE TABLE tags (
    tx_id TEXT NOT NULL,
    \"index\" INTEGER NOT NULL,
    name TEXT,
    value TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    CONSTRAINT pkey_tags PRIMARY KEY (tx_id, \"index\")
);
CREATE TABLE wallets (
    id TEXT NOT NULL,
    address TEXT NOT NULL,
    balance REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    CONSTRAINT pkey_wallets PRIMARY KEY (id)
);
CREATE TABLE chunks (
    id TEXT NOT NULL,
    chunk TEXT NOT NULL,
    data_root TEXT NOT NULL,
    data_size TEXT NOT NULL,
    \"offset\" TEXT NOT NULL,
    data_path TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    CONSTRAINT pkey_chunks PRIMARY KEY (id)
);
",
        extra_columns
    ));

    for index in index_plan(registry) {
        let columns: Vec<String> = index.columns.iter().map(|c| quote(c)).collect();
        sql.push_str(&format!(
            "CREATE INDEX {} ON {} ({});\n",
            quote(&index.name),
            index.table,
            columns.join(", ")
        ));
    }
    sql
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
