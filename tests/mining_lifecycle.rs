//! Integration tests for the submit -> mine -> confirm lifecycle

use localweave::encoding::to_b64url;
use localweave::error::EmulatorError;
use localweave::ledger::Ledger;
use localweave::network::NetworkState;
use localweave::schema::ColumnRegistry;
use localweave::transaction::{Tag, Transaction};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn create_ledger() -> Ledger {
    Ledger::in_memory(ColumnRegistry::default()).expect("Failed to create ledger")
}

fn genesis() -> NetworkState {
    NetworkState::genesis("localweave.N.1", "genesis")
}

fn create_test_tx(id: &str) -> Transaction {
    Transaction::new(id, to_b64url(b"test-owner"))
}

#[test]
fn test_first_block_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = create_ledger();
    let id = "a".repeat(64);
    ledger.submit_transaction(create_test_tx(&id))?;
    assert_eq!(ledger.get_transaction(&id)?.block, "");

    let pending = ledger.transactions.get_unmined_txs()?;
    let block_id = ledger.blocks.mine(0, "genesis", &pending)?;
    let block = ledger.get_block(&block_id)?;
    assert_eq!(block.height, 0);
    assert_eq!(block.previous_block, "genesis");
    assert_eq!(block.txs, vec![id.clone()]);

    assert_eq!(ledger.transactions.mine_txs(&block_id)?, 1);
    assert_eq!(ledger.get_transaction(&id)?.block, block_id);
    Ok(())
}

#[test]
fn test_round_confirms_exactly_the_pending_set() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = create_ledger();
    let ids: Vec<String> = (0..5).map(|i| format!("tx{}", i)).collect();
    for id in &ids {
        ledger.submit_transaction(create_test_tx(id))?;
    }

    let state = ledger.mine_block(&genesis(), 1)?;
    let block = ledger.get_block(&state.current)?;
    assert_eq!(block.txs, ids);
    for id in &ids {
        assert_eq!(ledger.get_transaction(id)?.block, block.id);
    }

    // Submitted after the round: left for the next one.
    ledger.submit_transaction(create_test_tx("late"))?;
    assert!(ledger.get_transaction("late")?.is_pending());

    let state = ledger.mine_block(&state, 1)?;
    let next = ledger.get_block(&state.current)?;
    assert_eq!(next.txs, vec!["late".to_string()]);
    Ok(())
}

#[test]
fn test_chain_linkage_and_heights() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = create_ledger();
    let mut state = genesis();
    let mut previous = "genesis".to_string();

    for expected_height in 0..4u64 {
        state = ledger.mine_block(&state, 1)?;
        let block = ledger.get_block(&state.current)?;
        assert_eq!(block.height, expected_height);
        assert_eq!(block.previous_block, previous);
        previous = block.id;
    }
    assert_eq!(state.height, 4);
    assert_eq!(state.blocks, 4);

    let b1 = ledger.blocks.get_by_height(1)?;
    let b2 = ledger.blocks.get_by_height(2)?;
    assert!(b2.follows(&b1));
    Ok(())
}

#[test]
fn test_empty_round_still_advances() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = create_ledger();
    let state = ledger.mine_block(&genesis(), 5)?;
    assert_eq!(state.height, 5);
    assert_eq!(state.blocks, 5);
    assert!(ledger.get_block(&state.current)?.txs.is_empty());
    Ok(())
}

#[test]
fn test_tag_query_finds_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = create_ledger();
    let tx = create_test_tx("tagged").with_tags(vec![
        Tag::from_text("App-Name", "Test"),
        Tag::from_text("Content-Type", "application/json"),
    ]);
    ledger.submit_transaction(tx)?;

    assert_eq!(
        ledger.transactions.get_by_tag("App-Name", "Test")?,
        vec!["tagged".to_string()]
    );

    let stored = ledger.get_transaction("tagged")?;
    let rows: Vec<(String, String)> = ledger
        .transactions
        .get_tags("tagged")?
        .into_iter()
        .map(|r| (r.name, r.value))
        .collect();
    assert_eq!(rows, stored.decoded_tags()?);
    Ok(())
}

#[test]
fn test_read_errors_are_typed() {
    let ledger = create_ledger();
    assert!(matches!(
        ledger.get_transaction("missing"),
        Err(EmulatorError::NotFound(_))
    ));
    assert!(matches!(
        ledger.get_wallet("missing"),
        Err(EmulatorError::NotFound(_))
    ));
    assert!(matches!(
        ledger.get_chunk("missing"),
        Err(EmulatorError::NotFound(_))
    ));
}

#[test]
fn test_initialize_twice_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = create_ledger();
    ledger.submit_transaction(create_test_tx("t"))?;
    ledger.mine_block(&genesis(), 1)?;

    ledger.database().initialize()?;
    ledger.database().initialize()?;
    assert!(ledger.transactions.get_unmined_txs()?.is_empty());
    assert_eq!(ledger.blocks.count()?, 0);
    assert!(ledger.get_transaction("t").is_err());
    Ok(())
}

#[test]
fn test_concurrent_rounds_never_share_transactions() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(create_ledger());

    let submitters: Vec<_> = (0..4)
        .map(|worker| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    ledger
                        .submit_transaction(create_test_tx(&format!("w{}-{}", worker, i)))
                        .expect("submit failed");
                }
            })
        })
        .collect();

    // Each miner mines from its own counters; heights may repeat, ids may not.
    let miners: Vec<_> = (0..3)
        .map(|_| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                let mut state = NetworkState::genesis("localweave.N.1", "genesis");
                let mut blocks = Vec::new();
                for _ in 0..10 {
                    state = ledger.mine_block(&state, 1).expect("mining failed");
                    blocks.push(state.current.clone());
                }
                blocks
            })
        })
        .collect();

    for handle in submitters {
        handle.join().expect("submitter panicked");
    }
    let mut block_ids = Vec::new();
    for handle in miners {
        block_ids.extend(handle.join().expect("miner panicked"));
    }
    let state = ledger.mine_block(&genesis(), 1)?;
    block_ids.push(state.current);

    let mut seen = HashSet::new();
    for block_id in &block_ids {
        for tx_id in ledger.get_block(block_id)?.txs {
            assert!(seen.insert(tx_id.clone()), "{} mined twice", tx_id);
            assert_eq!(ledger.get_transaction(&tx_id)?.block, *block_id);
        }
    }
    assert_eq!(seen.len(), 100);
    assert!(ledger.transactions.get_unmined_txs()?.is_empty());
    Ok(())
}
