//! Background auto-mining
//!
//! Runs a mining round on a fixed interval through [`Node::mine`], the same
//! path a client request takes.

use crate::node::Node;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub fn spawn_auto_miner(node: Arc<Node>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match node.mine(1).await {
                Ok(state) => debug!(height = state.height, current = %state.current, "Auto-mined block"),
                // No client is waiting on this round; the next tick retries.
                Err(e) => warn!(error = %e, "Auto-mining round failed"),
            }
        }
    })
}
