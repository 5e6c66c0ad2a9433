/// Block types for LocalWeave
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of a generated block id
pub const BLOCK_ID_LENGTH: usize = 64;

/// A sealed batch of transaction ids. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub height: u64,
    pub mined_at: DateTime<Utc>,
    pub previous_block: String,
    pub txs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended: Option<serde_json::Value>,
}

impl Block {
    /// Builds the next block on top of `previous_block` with a fresh random id.
    pub fn new(height: u64, previous_block: impl Into<String>, txs: Vec<String>) -> Self {
        Block {
            id: crate::encoding::random_id(BLOCK_ID_LENGTH),
            height,
            mined_at: Utc::now(),
            previous_block: previous_block.into(),
            txs,
            extended: None,
        }
    }

    pub fn with_extended(mut self, extended: serde_json::Value) -> Self {
        self.extended = Some(extended);
        self
    }

    /// True when this block directly follows `parent`.
    pub fn follows(&self, parent: &Block) -> bool {
        self.previous_block == parent.id && parent.height.checked_add(1) == Some(self.height)
    }
}
