//! Chain counters threaded through each mining round

use crate::error::{EmulatorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const NETWORK_VERSION: u32 = 5;
pub const NETWORK_RELEASE: u32 = 53;

/// Snapshot of the emulated network. Mining never mutates a snapshot; it
/// returns the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub network: String,
    pub version: u32,
    pub release: u32,
    pub height: u64,
    /// Id of the most recent block, or the genesis marker before the first one.
    pub current: String,
    pub blocks: u64,
    pub peers: u32,
}

impl NetworkState {
    pub fn genesis(network: impl Into<String>, genesis: impl Into<String>) -> Self {
        NetworkState {
            network: network.into(),
            version: NETWORK_VERSION,
            release: NETWORK_RELEASE,
            height: 0,
            current: genesis.into(),
            blocks: 0,
            peers: 0,
        }
    }

    /// State after a mining round that produced `block_id` and advanced the
    /// counters by `step`.
    pub fn advanced(&self, block_id: impl Into<String>, step: u64) -> Result<Self> {
        check_step(step)?;
        let overflow = || EmulatorError::InvalidInput("Chain height overflow".to_string());
        Ok(NetworkState {
            height: self.height.checked_add(step).ok_or_else(overflow)?,
            blocks: self.blocks.checked_add(step).ok_or_else(overflow)?,
            current: block_id.into(),
            ..self.clone()
        })
    }
}

const COUNTERS_KEY: &str = "counters";

/// Counter values a round left behind. Stored in the block's `extended`
/// metadata so a reopened database resumes from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub height: u64,
    pub blocks: u64,
}

impl Counters {
    pub fn of(state: &NetworkState) -> Self {
        Counters {
            height: state.height,
            blocks: state.blocks,
        }
    }

    pub fn to_extended(self) -> Value {
        let mut map = Map::new();
        map.insert(
            COUNTERS_KEY.to_string(),
            serde_json::json!({ "height": self.height, "blocks": self.blocks }),
        );
        Value::Object(map)
    }

    /// Counters recorded in `extended`, if any.
    pub fn from_extended(extended: &Value) -> Option<Self> {
        serde_json::from_value(extended.get(COUNTERS_KEY)?.clone()).ok()
    }
}

fn check_step(step: u64) -> Result<()> {
    if step == 0 {
        return Err(EmulatorError::InvalidInput(
            "Mining step must be at least 1".to_string(),
        ));
    }
    Ok(())
}
