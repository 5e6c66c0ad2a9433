//! Integration tests for LocalWeave API endpoints
//!
//! These tests drive the router through `axum-test` against an in-memory ledger.

use axum_test::TestServer;
use localweave::api::build_api_router;
use localweave::config::Config;
use localweave::encoding::to_b64url;
use localweave::node::Node;
use serde_json::{json, Value};
use std::sync::Arc;

fn create_server() -> (TestServer, Arc<Node>) {
    let mut config = Config::default();
    config.database.path = ":memory:".to_string();
    config.database.persist = false;
    let node = Arc::new(Node::init(config).expect("Failed to create node"));
    let server = TestServer::new(build_api_router(node.clone())).expect("Failed to create test server");
    (server, node)
}

fn tx_json(id: &str) -> Value {
    json!({
        "id": id,
        "owner": to_b64url(b"owner-key"),
        "tags": [
            { "name": to_b64url(b"App-Name"), "value": to_b64url(b"Test") }
        ],
        "quantity": "0",
        "reward": "0",
        "data_size": "0",
        "format": 2
    })
}

#[tokio::test]
async fn test_info_endpoint() {
    let (server, _) = create_server();

    let response = server.get("/info").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["height"], 0);
    assert_eq!(json["blocks"], 0);
    assert_eq!(json["current"], "genesis");
    assert_eq!(json["queue_length"], 0);
}

#[tokio::test]
async fn test_submit_mine_confirm() {
    let (server, node) = create_server();
    let id = "a".repeat(64);

    let response = server.post("/tx").json(&tx_json(&id)).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["id"], id);

    let response = server.get(&format!("/tx/{}/status", id)).await;
    assert_eq!(response.json::<Value>()["status"], "pending");

    let pending: Vec<String> = server.get("/tx/pending").await.json();
    assert_eq!(pending, vec![id.clone()]);

    let response = server.get("/mine").await;
    assert_eq!(response.status_code(), 200);
    let state: Value = response.json();
    assert_eq!(state["height"], 1);
    assert_eq!(state["blocks"], 1);
    let block_id = state["current"].as_str().unwrap().to_string();
    assert_eq!(node.state().await.current, block_id);

    let block: Value = server.get(&format!("/block/hash/{}", block_id)).await.json();
    assert_eq!(block["height"], 0);
    assert_eq!(block["previous_block"], "genesis");
    assert_eq!(block["txs"], json!([id]));

    let tx: Value = server.get(&format!("/tx/{}", id)).await.json();
    assert_eq!(tx["block"], block_id);

    let status: Value = server.get(&format!("/tx/{}/status", id)).await.json();
    assert_eq!(status["status"], "confirmed");
    assert_eq!(status["block_id"], block_id);
}

#[tokio::test]
async fn test_mine_quantity_and_errors() {
    let (server, _) = create_server();

    let state: Value = server.get("/mine/3").await.json();
    assert_eq!(state["height"], 3);

    let response = server.get("/mine/0").await;
    assert_eq!(response.status_code(), 400);
    assert!(response.json::<Value>()["error"].is_string());

    let response = server.get("/mine/abc").await;
    assert_eq!(response.status_code(), 400);

    let info: Value = server.get("/info").await.json();
    assert_eq!(info["height"], 3);
}

#[tokio::test]
async fn test_duplicate_and_missing_transactions() {
    let (server, _) = create_server();

    assert_eq!(server.post("/tx").json(&tx_json("dup")).await.status_code(), 200);
    assert_eq!(server.post("/tx").json(&tx_json("dup")).await.status_code(), 409);

    assert_eq!(server.get("/tx/missing").await.status_code(), 404);
    assert_eq!(server.get("/block/height/7").await.status_code(), 404);
}

#[tokio::test]
async fn test_tag_query() {
    let (server, _) = create_server();
    server.post("/tx").json(&tx_json("tagged")).await;

    let ids: Vec<String> = server.get("/tags/App-Name/Test").await.json();
    assert_eq!(ids, vec!["tagged".to_string()]);

    let tags: Value = server.get("/tx/tagged/tags").await.json();
    assert_eq!(tags[0]["name"], "App-Name");
    assert_eq!(tags[0]["value"], "Test");
}

#[tokio::test]
async fn test_wallet_and_chunk_endpoints() {
    let (server, _) = create_server();

    assert_eq!(server.get("/wallet/alice/balance").await.status_code(), 404);

    let response = server.get("/mint/alice/1000").await;
    assert_eq!(response.status_code(), 200);
    let balance: Value = server.get("/wallet/alice/balance").await.json();
    assert_eq!(balance["balance"], 1000.0);

    let response = server
        .post("/wallet")
        .json(&json!({ "address": "bob", "balance": 5.5 }))
        .await;
    assert_eq!(response.status_code(), 200);

    let response = server
        .post("/chunk")
        .json(&json!({
            "chunk": "ZGF0YQ",
            "data_root": "root",
            "data_size": "4",
            "offset": "0",
            "data_path": "cGF0aA"
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let id = response.json::<Value>()["id"].as_str().unwrap().to_string();

    let chunk: Value = server.get(&format!("/chunk/{}", id)).await.json();
    assert_eq!(chunk["data_root"], "root");
    assert_eq!(chunk["offset"], "0");
}
