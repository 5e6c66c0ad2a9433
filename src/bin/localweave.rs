#![forbid(unsafe_code)]
//! LocalWeave command line: serve the emulator, mine a block, reset the schema

use clap::{Parser, Subcommand};
use localweave::api::run_api_server;
use localweave::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use localweave::ledger::Ledger;
use localweave::miner::spawn_auto_miner;
use localweave::node::Node;
use localweave::persistence::Database;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[arg(long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the HTTP emulator
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// Drop all ledger tables on shutdown
        #[arg(long)]
        ephemeral: bool,
    },
    /// Mines one block against an existing database
    Mine {
        #[arg(long, default_value_t = 1)]
        qty: u64,
    },
    /// Tears the schema down (unless persistent) and recreates it
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).init();

    let config = load_config(&cli.config)?;
    match cli.command {
        Commands::Serve { port, ephemeral } => serve(config, port, ephemeral).await,
        Commands::Mine { qty } => mine(&config, qty),
        Commands::Reset => reset(&config),
    }
}

/// Applies the `serve` flags on top of the loaded configuration.
fn serve_config(mut config: Config, port: Option<u16>, ephemeral: bool) -> Config {
    if let Some(port) = port {
        config.network.port = port;
    }
    if ephemeral {
        config.database.persist = false;
    }
    config
}

async fn serve(
    config: Config,
    port: Option<u16>,
    ephemeral: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = serve_config(config, port, ephemeral);
    let interval = config.mining_interval()?;

    let node = Arc::new(Node::init(config)?);
    if let Some(interval) = interval {
        info!("Auto-mining every {}", humantime::format_duration(interval));
        spawn_auto_miner(node.clone(), interval);
    }

    tokio::select! {
        result = run_api_server(node.clone()) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down");
        }
    }
    node.shutdown()?;
    Ok(())
}

fn mine(config: &Config, qty: u64) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&config.database.path, config.column_registry()?)?;
    if !db.has_schema()? {
        return Err(format!(
            "{} has no ledger schema; run `localweave reset` first",
            config.database.path
        )
        .into());
    }

    let ledger = Ledger::new(Arc::new(db));
    let state = ledger.recover_state(&config.network.name, &config.network.genesis)?;
    let next = ledger.mine_block(&state, qty)?;
    println!("{}", serde_json::to_string_pretty(&next)?);
    Ok(())
}

fn reset(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&config.database.path, config.column_registry()?)?;
    db.teardown(&config.database.environment, config.database.persist)?;
    db.initialize()?;
    info!("Schema reset at {}", config.database.path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_flags_override_config() {
        let cli = Cli::try_parse_from(["localweave", "serve", "--port", "8080", "--ephemeral"]).unwrap();
        let Commands::Serve { port, ephemeral } = cli.command else {
            panic!("expected serve");
        };

        let config = serve_config(Config::default(), port, ephemeral);
        assert_eq!(config.network.port, 8080);
        assert!(!config.database.persist);

        let config = serve_config(Config::default(), None, false);
        assert_eq!(config.network.port, 1984);
        assert!(config.database.persist);
    }
}
