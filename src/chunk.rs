//! Raw data chunks, uploaded independently of mining

use crate::encoding::random_id;
use crate::error::{is_unique_violation, EmulatorError, Result};
use crate::persistence::Database;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: String,
    pub chunk: String,
    pub data_root: String,
    #[serde(with = "as_string")]
    pub data_size: u64,
    #[serde(with = "as_string")]
    pub offset: u64,
    pub data_path: String,
}

#[derive(Clone)]
pub struct ChunkStore {
    db: Arc<Database>,
}

impl ChunkStore {
    pub fn new(db: Arc<Database>) -> Self {
        ChunkStore { db }
    }

    /// Stores `chunk`, generating an id when it has none.
    pub fn insert(&self, mut chunk: Chunk) -> Result<Chunk> {
        if chunk.data_root.is_empty() {
            return Err(EmulatorError::InvalidInput(
                "Chunk data_root cannot be empty".to_string(),
            ));
        }
        if chunk.id.is_empty() {
            chunk.id = random_id(64);
        }

        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO chunks (id, chunk, data_root, data_size, \"offset\", data_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chunk.id,
                chunk.chunk,
                chunk.data_root,
                chunk.data_size.to_string(),
                chunk.offset.to_string(),
                chunk.data_path,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                EmulatorError::DuplicateId(chunk.id.clone())
            } else {
                EmulatorError::Database(format!("Failed to save chunk: {}", e))
            }
        })?;
        Ok(chunk)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Chunk> {
        let conn = self.db.lock()?;
        select(&conn, "id = ?1", params![id])?
            .into_iter()
            .next()
            .ok_or_else(|| EmulatorError::NotFound(format!("Chunk {} not found", id)))
    }

    pub fn get_by_root_and_offset(&self, data_root: &str, offset: u64) -> Result<Chunk> {
        let conn = self.db.lock()?;
        select(
            &conn,
            "data_root = ?1 AND \"offset\" = ?2",
            params![data_root, offset.to_string()],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| {
            EmulatorError::NotFound(format!("Chunk {}@{} not found", data_root, offset))
        })
    }

    /// All chunks of one data root, ordered by offset.
    pub fn get_root(&self, data_root: &str) -> Result<Vec<Chunk>> {
        let conn = self.db.lock()?;
        select(&conn, "data_root = ?1", params![data_root])
    }
}

fn select(conn: &Connection, condition: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, chunk, data_root, data_size, \"offset\", data_path FROM chunks
         WHERE {} ORDER BY CAST(\"offset\" AS INTEGER), rowid",
        condition
    ))?;
    let chunks = stmt
        .query_map(args, from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(chunks)
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        chunk: row.get(1)?,
        data_root: row.get(2)?,
        data_size: numeric(row, 3)?,
        offset: numeric(row, 4)?,
        data_path: row.get(5)?,
    })
}

fn numeric(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

mod as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Numeric {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Numeric::deserialize(deserializer)? {
            Numeric::Number(n) => Ok(n),
            Numeric::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnRegistry;

    fn store() -> ChunkStore {
        ChunkStore::new(Arc::new(Database::in_memory(ColumnRegistry::default()).unwrap()))
    }

    fn chunk(root: &str, offset: u64) -> Chunk {
        Chunk {
            id: String::new(),
            chunk: "ZGF0YQ".to_string(),
            data_root: root.to_string(),
            data_size: 300_000,
            offset,
            data_path: "cGF0aA".to_string(),
        }
    }

    #[test]
    fn test_insert_assigns_id() {
        let store = store();
        let stored = store.insert(chunk("root", 0)).unwrap();
        assert_eq!(stored.id.len(), 64);
        assert_eq!(store.get_by_id(&stored.id).unwrap(), stored);
        assert_eq!(
            store.insert(stored.clone()),
            Err(EmulatorError::DuplicateId(stored.id.clone()))
        );
    }

    #[test]
    fn test_root_lookups_order_by_offset() {
        let store = store();
        store.insert(chunk("root", 262_144)).unwrap();
        store.insert(chunk("root", 0)).unwrap();
        store.insert(chunk("other", 0)).unwrap();

        let offsets: Vec<u64> = store.get_root("root").unwrap().iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 262_144]);
        assert_eq!(
            store.get_by_root_and_offset("root", 262_144).unwrap().offset,
            262_144
        );
        assert!(matches!(
            store.get_by_root_and_offset("root", 1),
            Err(EmulatorError::NotFound(_))
        ));
    }
}
