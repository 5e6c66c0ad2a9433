use crate::config::Config;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::network::NetworkState;
use crate::persistence::Database;
use std::fs;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Request-facing holder of the ledger and the current network counters.
///
/// The counters live here rather than in the ledger: each successful mining
/// round replaces them with the state the ledger returned, a failed round
/// leaves them untouched.
pub struct Node {
    pub config: Config,
    pub ledger: Ledger,
    network: RwLock<NetworkState>,
}

impl Node {
    pub fn new(config: Config, ledger: Ledger, state: NetworkState) -> Self {
        Self {
            config,
            ledger,
            network: RwLock::new(state),
        }
    }

    /// Opens the configured database and bootstraps the schema.
    ///
    /// A persistent database that already holds the schema is reused and its
    /// counters recovered from the stored chain; anything else is initialized
    /// from scratch.
    pub fn init(config: Config) -> Result<Self> {
        let db_path = std::path::Path::new(&config.database.path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && config.database.path != ":memory:" {
                fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(&config.database.path, config.column_registry()?)?;
        let reuse = config.database.persist && db.has_schema()?;
        if !reuse {
            db.initialize()?;
        }
        let ledger = Ledger::new(Arc::new(db));

        let state = if reuse {
            let state = ledger.recover_state(&config.network.name, &config.network.genesis)?;
            info!(height = state.height, current = %state.current, "Reusing persisted chain");
            state
        } else {
            NetworkState::genesis(&config.network.name, &config.network.genesis)
        };

        info!(
            "Starting LocalWeave node (network = {}, db = {})",
            config.network.name, config.database.path
        );
        Ok(Self::new(config, ledger, state))
    }

    pub async fn state(&self) -> NetworkState {
        self.network.read().await.clone()
    }

    /// Mines one block and advances the counters by `step`. Rounds are
    /// serialized by the counter lock as well as by the database.
    pub async fn mine(&self, step: u64) -> Result<NetworkState> {
        let mut network = self.network.write().await;
        let next = self.ledger.mine_block(&network, step)?;
        *network = next.clone();
        Ok(next)
    }

    /// Tears the schema down unless the environment is persistent.
    pub fn shutdown(&self) -> Result<bool> {
        let dropped = self
            .ledger
            .database()
            .teardown(&self.config.database.environment, self.config.database.persist)?;
        if dropped {
            warn!(environment = %self.config.database.environment, "Ledger tables dropped");
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config(persist: bool) -> Config {
        let mut config = Config::default();
        config.database.path = ":memory:".to_string();
        config.database.persist = persist;
        config
    }

    #[tokio::test]
    async fn test_mine_replaces_state_only_on_success() {
        let node = Node::init(memory_config(false)).unwrap();
        let before = node.state().await;
        assert!(node.mine(0).await.is_err());
        assert_eq!(node.state().await, before);

        let after = node.mine(2).await.unwrap();
        assert_eq!(after.height, 2);
        assert_eq!(node.state().await, after);
    }

    #[tokio::test]
    async fn test_shutdown_respects_persist() {
        let node = Node::init(memory_config(true)).unwrap();
        assert!(!node.shutdown().unwrap());
        assert!(node.ledger.database().has_schema().unwrap());

        let node = Node::init(memory_config(false)).unwrap();
        assert!(node.shutdown().unwrap());
        assert!(!node.ledger.database().has_schema().unwrap());
    }

    #[test]
    fn test_persistent_file_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("chain.db").to_string_lossy().into_owned();

        let node = Node::init(config.clone()).unwrap();
        let state = node.state_blocking();
        let state = node.ledger.mine_block(&state, 1).unwrap();
        drop(node);

        let node = Node::init(config).unwrap();
        assert_eq!(node.state_blocking(), state);
    }

    #[test]
    fn test_restart_keeps_stepped_counters() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("chain.db").to_string_lossy().into_owned();

        let node = Node::init(config.clone()).unwrap();
        let state = node.ledger.mine_block(&node.state_blocking(), 3).unwrap();
        assert_eq!((state.height, state.blocks), (3, 3));
        drop(node);

        let node = Node::init(config).unwrap();
        assert_eq!(node.state_blocking(), state);

        let next = node.ledger.mine_block(&node.state_blocking(), 1).unwrap();
        assert_eq!(node.ledger.get_block(&next.current).unwrap().height, 3);
    }

    impl Node {
        fn state_blocking(&self) -> NetworkState {
            self.network.blocking_read().clone()
        }
    }
}
