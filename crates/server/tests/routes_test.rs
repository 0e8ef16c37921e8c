use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use powchain_chain::{
    Blockchain, BlockchainConfig, ConsensusResolver, PeerChain, PeerClient, PeerError,
    ResolverConfig,
};
use powchain_consensus::Difficulty;
use powchain_core::{Keypair, Transaction};
use powchain_server::{router, AppState, MintConfig};
use powchain_storage::{MemoryLedger, MemoryPeers};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// =============================================================================
// Helpers
// =============================================================================

/// Peers that serve a fixed chain.
struct FixedPeers {
    chain: Vec<powchain_core::Block>,
}

#[async_trait]
impl PeerClient for FixedPeers {
    async fn fetch_chain(&self, _peer: &str) -> Result<PeerChain, PeerError> {
        Ok(PeerChain::new(self.chain.clone()))
    }

    async fn announce(&self, _peer: &str, _address: &str) -> Result<(), PeerError> {
        Ok(())
    }
}

fn blockchain() -> Arc<Blockchain> {
    let config = BlockchainConfig {
        difficulty: Difficulty(2),
        ..BlockchainConfig::default()
    };
    Arc::new(
        Blockchain::open(
            Box::new(MemoryLedger::new()),
            Box::new(MemoryPeers::new()),
            config,
        )
        .unwrap(),
    )
}

struct TestNode {
    app: Router,
    blockchain: Arc<Blockchain>,
}

fn node_with(mint: MintConfig, peer_chain: Vec<powchain_core::Block>) -> TestNode {
    let blockchain = blockchain();
    let resolver = ConsensusResolver::new(
        Arc::new(FixedPeers { chain: peer_chain }),
        ResolverConfig {
            max_concurrent: 2,
            timeout: Duration::from_secs(1),
        },
    );
    let app = router(AppState {
        blockchain: Arc::clone(&blockchain),
        resolver,
        mint,
    });
    TestNode { app, blockchain }
}

fn node() -> TestNode {
    node_with(MintConfig::default(), Vec::new())
}

fn minting(token: Option<&str>) -> MintConfig {
    MintConfig {
        enabled: true,
        token: token.map(str::to_string),
        amount: 1000,
        key_bits: 1024,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_with_token(app, uri, body, None).await
}

async fn post_with_token(
    app: &Router,
    uri: &str,
    body: Value,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header("x-mint-token", token);
    }
    send(app, request.body(Body::from(body.to_string())).unwrap()).await
}

// =============================================================================
// Chain
// =============================================================================

#[tokio::test]
async fn test_get_chain_starts_with_genesis() {
    let node = node();
    let (status, body) = get(&node.app, "/get_chain").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["length"], 1);
    assert_eq!(body["chain"][0]["index"], 1);
    assert_eq!(body["chain"][0]["proof"], 0);
    assert_eq!(body["chain"][0]["previous_hash"], "null");
}

#[tokio::test]
async fn test_mine_block() {
    let node = node();
    let (status, body) = get(&node.app, "/mine_block").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Congratulations, you just mined a block!");
    assert_eq!(body["index"], 2);
    assert_eq!(
        body["previous_hash"],
        node.blockchain.chain()[0].hash().to_hex()
    );
    assert_eq!(node.blockchain.len(), 2);

    let (_, body) = get(&node.app, "/is_valid").await;
    assert_eq!(body["message"], "All good. The Blockchain is valid.");
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
async fn test_add_root_transaction() {
    let node = node_with(minting(None), Vec::new());
    let (status, body) = post(
        &node.app,
        "/add_transaction",
        json!({"sender": "root", "receiver": "wallet", "amount": 1000}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "This transaction will be added to Block 2");
    assert_eq!(
        body["pending_transactions"],
        json!([{"sender": "root", "receiver": "wallet", "amount": 1000}])
    );
}

#[tokio::test]
async fn test_root_transaction_forbidden_without_mint() {
    let node = node_with(
        MintConfig {
            enabled: false,
            token: Some("s3cret".to_string()),
            ..MintConfig::default()
        },
        Vec::new(),
    );
    let issuance = json!({"sender": "root", "receiver": "attacker", "amount": u64::MAX});

    let (status, _) =
        post_with_token(&node.app, "/add_transaction", issuance, Some("s3cret")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(node.blockchain.pending_transactions().is_empty());

    // Signing as root does not get around the gate either.
    let signer = Keypair::generate_with_bits(1024).unwrap();
    let (status, _) = post(
        &node.app,
        "/new_transaction",
        json!({
            "transaction": {"sender": "root", "receiver": "attacker", "amount": 5},
            "private_key": signer.private_key().unwrap(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(node.blockchain.pending_transactions().is_empty());
}

#[tokio::test]
async fn test_root_transaction_requires_mint_token() {
    let node = node_with(minting(Some("s3cret")), Vec::new());
    let issuance = json!({"sender": "root", "receiver": "wallet", "amount": 10});

    let (status, _) = post(&node.app, "/add_transaction", issuance.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) =
        post_with_token(&node.app, "/add_transaction", issuance.clone(), Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(node.blockchain.pending_transactions().is_empty());

    let (status, _) =
        post_with_token(&node.app, "/add_transaction", issuance, Some("s3cret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node.blockchain.pending_transactions().len(), 1);
}

#[tokio::test]
async fn test_add_transaction_rejects_bad_key() {
    let node = node();
    let (status, body) = post(
        &node.app,
        "/add_transaction",
        json!({"sender": "nobody", "receiver": "wallet", "amount": 1, "signature": "AAAA"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("sender"));
    assert!(node.blockchain.pending_transactions().is_empty());
}

#[tokio::test]
async fn test_signed_transfer_and_balance() {
    let node = node_with(minting(None), Vec::new());
    let alice = Keypair::generate_with_bits(1024).unwrap();
    let bob = Keypair::generate_with_bits(1024).unwrap();
    let alice_id = alice.identity().unwrap();
    let bob_id = bob.identity().unwrap();

    post(
        &node.app,
        "/add_transaction",
        json!({"sender": "root", "receiver": alice_id, "amount": 100}),
    )
    .await;
    get(&node.app, "/mine_block").await;

    let tx = Transaction::new(alice_id.clone(), bob_id.clone(), 40).signed(&alice);
    let (status, _) = post(&node.app, "/add_transaction", serde_json::to_value(&tx).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &node.app,
        "/new_transaction",
        json!({
            "transaction": {"sender": alice_id, "receiver": bob_id, "amount": 10},
            "private_key": alice.private_key().unwrap(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pending_transactions"].as_array().unwrap().len(), 2);

    get(&node.app, "/mine_block").await;

    let (_, balance) = post(&node.app, "/get_balance", json!({"address": alice_id})).await;
    assert_eq!(balance, json!({"total": 50, "income": 100, "outcome": 50}));

    let (_, history) = post(&node.app, "/get_transactions", json!({"address": bob_id})).await;
    assert_eq!(history["success"].as_array().unwrap().len(), 2);
    assert!(history["pending"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_overspend_is_bad_request() {
    let node = node();
    let alice = Keypair::generate_with_bits(1024).unwrap();
    let bob = Keypair::generate_with_bits(1024).unwrap();

    let tx = Transaction::new(alice.identity().unwrap(), bob.identity().unwrap(), 50)
        .signed(&alice);
    let (status, body) = post(&node.app, "/add_transaction", serde_json::to_value(&tx).unwrap()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("insufficient balance"));
}

#[tokio::test]
async fn test_new_transaction_rejects_bad_private_key() {
    let node = node();
    let (status, _) = post(
        &node.app,
        "/new_transaction",
        json!({
            "transaction": {"sender": "a", "receiver": "b", "amount": 1},
            "private_key": "not a key",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Network
// =============================================================================

#[tokio::test]
async fn test_connect_node() {
    let node = node();
    let (status, body) = post(&node.app, "/connect_node", json!({"node": "127.0.0.1:5001"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "All the nodes are now connected.");
    assert_eq!(body["total_nodes"], 1);

    let (_, body) = post(&node.app, "/connect_node", json!({"node": "127.0.0.1:5001"})).await;
    assert_eq!(body["total_nodes"], 1);

    let (status, _) = post(&node.app, "/connect_node", json!({"node": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_replace_chain() {
    let donor = blockchain();
    donor.mine().unwrap();
    donor.mine().unwrap();

    let node = node_with(MintConfig::default(), donor.chain());
    let (_, body) = get(&node.app, "/replace_chain").await;
    assert_eq!(body["message"], "All good. The chain is the largest one");

    post(&node.app, "/connect_node", json!({"node": "peer:1"})).await;
    let (status, body) = get(&node.app, "/replace_chain").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "The nodes had different chains so the chain was replaced by the longest chain."
    );
    assert_eq!(node.blockchain.chain(), donor.chain());
}

#[tokio::test]
async fn test_join_network() {
    let node = node();
    post(&node.app, "/connect_node", json!({"node": "a:1"})).await;
    post(&node.app, "/connect_node", json!({"node": "b:1"})).await;

    let (status, body) = post(&node.app, "/join_network", json!({"node": "me:5000"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["announced"], 2);
}

// =============================================================================
// Wallets
// =============================================================================

#[tokio::test]
async fn test_new_wallet_disabled_by_default() {
    let node = node();
    let (status, _) = post(&node.app, "/new_wallet", Value::Null).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_new_wallet_requires_token() {
    let node = node_with(minting(Some("s3cret")), Vec::new());

    let (status, _) = post(&node.app, "/new_wallet", Value::Null).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) =
        post_with_token(&node.app, "/new_wallet", Value::Null, Some("s3cret")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["private_key"].as_str().unwrap().len() > 100);
}

#[tokio::test]
async fn test_new_wallet_grants_mint_amount() {
    let node = node_with(minting(None), Vec::new());
    let (status, wallet) = post(&node.app, "/new_wallet", Value::Null).await;
    assert_eq!(status, StatusCode::OK);

    let pending = node.blockchain.pending_transactions();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].is_issuance());
    assert_eq!(pending[0].receiver.as_str(), wallet["public_key"].as_str().unwrap());
    assert_eq!(pending[0].amount, 1000);

    // The returned private key controls the returned identity.
    let keypair = Keypair::from_private_key(wallet["private_key"].as_str().unwrap()).unwrap();
    assert_eq!(
        keypair.identity().unwrap().as_str(),
        wallet["public_key"].as_str().unwrap()
    );
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let node = node();
    let request = Request::builder()
        .uri("/get_chain")
        .header(header::ORIGIN, "http://wallet.example")
        .body(Body::empty())
        .unwrap();
    let response = node.app.clone().oneshot(request).await.unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
