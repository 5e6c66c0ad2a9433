//! Configuration management for LocalWeave

use crate::error::{EmulatorError, Result};
use crate::schema::{ColumnRegistry, IndexKind};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub mining: MiningConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_network_name")]
    pub name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Predecessor id recorded on the very first block.
    #[serde(default = "default_genesis")]
    pub genesis: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Schema namespace that teardown operates on.
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_persist")]
    pub persist: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub indices: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MiningConfig {
    /// Humantime duration, e.g. "10s". Auto-mining is off when unset.
    #[serde(default)]
    pub interval: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            port: default_port(),
            genesis: default_genesis(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            environment: default_environment(),
            persist: default_persist(),
        }
    }
}

impl Config {
    /// Resolves the configured index names into the column registry used by
    /// schema bootstrap.
    pub fn column_registry(&self) -> Result<ColumnRegistry> {
        ColumnRegistry::new(
            self.schema
                .indices
                .iter()
                .map(|name| (name.clone(), IndexKind::Hash)),
        )
    }

    pub fn mining_interval(&self) -> Result<Option<Duration>> {
        match &self.mining.interval {
            None => Ok(None),
            Some(raw) => {
                let interval = humantime::parse_duration(raw).map_err(|e| {
                    EmulatorError::Config(format!("Invalid mining.interval '{}': {}", raw, e))
                })?;
                if interval.is_zero() {
                    return Err(EmulatorError::Config(
                        "mining.interval must be greater than zero".to_string(),
                    ));
                }
                Ok(Some(interval))
            }
        }
    }

    /// Applies `INDICES`, `ENVIRONMENT`, `PERSIST` and `DATABASE_PATH` on top of
    /// the file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("INDICES") {
            self.schema.indices = serde_json::from_str(&raw)
                .map_err(|e| EmulatorError::Config(format!("INDICES must be a JSON array: {}", e)))?;
        }
        if let Some(environment) = lookup("ENVIRONMENT") {
            self.database.environment = environment;
        }
        if let Some(raw) = lookup("PERSIST") {
            self.database.persist = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(EmulatorError::Config(format!(
                        "PERSIST must be a boolean, got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = path;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.is_empty() {
            return Err(EmulatorError::Config(
                "database.path must be set in config.toml".to_string(),
            ));
        }
        if self.database.environment.is_empty() {
            return Err(EmulatorError::Config(
                "database.environment must not be empty".to_string(),
            ));
        }
        if self.network.genesis.is_empty() {
            return Err(EmulatorError::Config(
                "network.genesis must not be empty".to_string(),
            ));
        }
        self.column_registry()
            .map_err(|e| EmulatorError::Config(e.to_string()))?;
        self.mining_interval()?;
        Ok(())
    }
}

/// Loads `path`, falling back to defaults when the file is absent, then applies
/// environment overrides and validates the result.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let mut config: Config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)
            .map_err(|e| EmulatorError::Config(format!("{}: {}", path.display(), e)))?
    } else {
        Config::default()
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn default_network_name() -> String {
    "localweave.N.1".to_string()
}

fn default_port() -> u16 {
    1984
}

fn default_genesis() -> String {
    "genesis".to_string()
}

fn default_db_path() -> String {
    "./localweave.db".to_string()
}

fn default_environment() -> String {
    "main".to_string()
}

fn default_persist() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.network.port, 1984);
        assert_eq!(config.network.genesis, "genesis");
        assert_eq!(config.database.environment, "main");
        assert!(config.mining_interval().unwrap().is_none());
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[network]
port = 2000

[database]
path = ":memory:"
persist = false

[schema]
indices = ["App-Name", "protocol"]

[mining]
interval = "250ms"
"#,
        )
        .unwrap();

        let config: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.network.port, 2000);
        assert!(!config.database.persist);
        assert_eq!(config.schema.indices, vec!["App-Name", "protocol"]);
        assert_eq!(
            config.mining_interval().unwrap(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.column_registry().unwrap().columns().len(), 2);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("INDICES", r#"["App-Name"]"#),
            ("ENVIRONMENT", "test"),
            ("PERSIST", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.schema.indices, vec!["App-Name"]);
        assert_eq!(config.database.environment, "test");
        assert!(!config.database.persist);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.apply_env(|key| (key == "INDICES").then(|| "nope".to_string())).is_err());

        let mut config = Config::default();
        config.schema.indices = vec!["bad name;".to_string()];
        assert!(matches!(config.validate(), Err(EmulatorError::Config(_))));

        let mut config = Config::default();
        config.mining.interval = Some("0s".to_string());
        assert!(config.validate().is_err());
    }
}
