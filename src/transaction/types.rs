/// Transaction types for LocalWeave
use crate::encoding::{self, b64url_to_string};
use crate::error::{EmulatorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Maximum length of a transaction id
pub const MAX_ID_LENGTH: usize = 64;

/// Transaction format used when the client omits one
pub const DEFAULT_FORMAT: u8 = 2;

/// A name/value pair attached to a transaction, both base64url-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    /// Builds a tag from plain text, encoding both halves.
    pub fn from_text(name: &str, value: &str) -> Self {
        Tag {
            name: encoding::to_b64url(name.as_bytes()),
            value: encoding::to_b64url(value.as_bytes()),
        }
    }

    pub fn decode(&self) -> Result<(String, String)> {
        Ok((b64url_to_string(&self.name)?, b64url_to_string(&self.value)?))
    }
}

/// A row of the `tags` table: one decoded tag at its position in the
/// transaction's tag list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub tx_id: String,
    pub index: u32,
    pub name: String,
    pub value: String,
}

/// A submitted transaction. `block` is empty while pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub reward: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub last_tx: String,
    #[serde(default, with = "numeric_string")]
    pub data_size: u64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default = "default_format")]
    pub format: u8,
    #[serde(default)]
    pub owner_address: String,
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub block: String,
    /// Height of the confirming block, set together with `block`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a pending transaction with every optional field empty.
    pub fn new(id: impl Into<String>, owner: impl Into<String>) -> Self {
        Transaction {
            id: id.into(),
            owner: owner.into(),
            tags: Vec::new(),
            target: String::new(),
            quantity: "0".to_string(),
            reward: "0".to_string(),
            signature: String::new(),
            last_tx: String::new(),
            data_size: 0,
            content_type: String::new(),
            format: DEFAULT_FORMAT,
            owner_address: String::new(),
            data_root: None,
            parent: None,
            block: String::new(),
            height: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.block.is_empty()
    }

    /// Tag list decoded to text, in submission order.
    pub fn decoded_tags(&self) -> Result<Vec<(String, String)>> {
        self.tags.iter().map(Tag::decode).collect()
    }

    /// Decoded value of the first tag named `name` (case-insensitive), or "".
    pub fn tag_value(&self, name: &str) -> String {
        encoding::tag_value(&self.tags, name)
    }

    /// Checks the fields a store needs before accepting the transaction.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(EmulatorError::InvalidTransaction(
                "Transaction id cannot be empty".to_string(),
            ));
        }
        if self.id.len() > MAX_ID_LENGTH {
            return Err(EmulatorError::InvalidTransaction(format!(
                "Transaction id too long: {} chars (max: {})",
                self.id.len(),
                MAX_ID_LENGTH
            )));
        }
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(EmulatorError::InvalidTransaction(format!(
                "Transaction id '{}' is not base64url",
                self.id
            )));
        }
        if !self.block.is_empty() {
            return Err(EmulatorError::InvalidTransaction(
                "A submitted transaction cannot already belong to a block".to_string(),
            ));
        }
        self.decoded_tags()
            .map_err(|e| EmulatorError::InvalidTransaction(format!("Malformed tag: {}", e)))?;
        Ok(())
    }

    /// Fills the fields derived from other fields: `owner_address` from `owner`
    /// and `content_type` from the Content-Type tag.
    pub fn fill_derived(&mut self) -> Result<()> {
        if self.owner_address.is_empty() && !self.owner.is_empty() {
            self.owner_address = encoding::owner_to_address(&self.owner).map_err(|e| {
                EmulatorError::InvalidTransaction(format!("Malformed owner: {}", e))
            })?;
        }
        if self.content_type.is_empty() {
            self.content_type = self.tag_value("Content-Type");
        }
        Ok(())
    }
}

fn default_format() -> u8 {
    DEFAULT_FORMAT
}

/// Sizes travel as decimal strings on the wire but plain numbers are accepted too.
mod numeric_string {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Numeric {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
        match Numeric::deserialize(deserializer)? {
            Numeric::Number(n) => Ok(n),
            Numeric::Text(s) if s.is_empty() => Ok(0),
            Numeric::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
