//! Longest-valid-chain resolution across peers.

use crate::blockchain::{Blockchain, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use powchain_consensus::ChainValidator;
use powchain_core::Block;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A peer's answer to "send me your chain".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerChain {
    pub chain: Vec<Block>,
    pub length: usize,
}

impl PeerChain {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len();
        Self { chain, length }
    }
}

/// Failures talking to a single peer. Never fatal to a resolution round.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {peer} timed out")]
    Timeout { peer: String },

    #[error("peer {peer} is unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("peer {peer} sent a malformed response: {reason}")]
    Malformed { peer: String, reason: String },

    #[error("peer {peer} reported length {reported} but sent {actual} blocks")]
    LengthMismatch {
        peer: String,
        reported: usize,
        actual: usize,
    },
}

/// Transport used to reach other nodes.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Fetch the peer's full chain.
    async fn fetch_chain(&self, peer: &str) -> std::result::Result<PeerChain, PeerError>;

    /// Ask the peer to register `address`.
    async fn announce(&self, peer: &str, address: &str) -> std::result::Result<(), PeerError>;
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum peer requests in flight.
    pub max_concurrent: usize,
    /// Deadline for each peer request.
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Reconciles the local chain with registered peers.
#[derive(Clone)]
pub struct ConsensusResolver {
    client: Arc<dyn PeerClient>,
    config: ResolverConfig,
}

impl ConsensusResolver {
    pub fn new(client: Arc<dyn PeerClient>, config: ResolverConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Adopt the longest valid peer chain if it beats the local one.
    ///
    /// Returns whether the local chain was replaced. Unresponsive or
    /// misbehaving peers are logged and skipped.
    pub async fn resolve(&self, blockchain: &Blockchain) -> Result<bool> {
        let peers = blockchain.nodes();
        if peers.is_empty() {
            debug!("no peers registered, nothing to resolve");
            return Ok(false);
        }

        let local_len = blockchain.len();
        let results = self.fetch_all(peers).await;

        let candidates = results.into_iter().filter_map(|(peer, result)| match result {
            Ok(peer_chain) => Some(peer_chain.chain),
            Err(e) => {
                warn!(%peer, "skipping peer: {}", e);
                None
            }
        });

        match select_longest(local_len, candidates, &blockchain.validator()) {
            Some(candidate) => blockchain.adopt_validated_chain(candidate),
            None => {
                info!(length = local_len, "local chain is the longest");
                Ok(false)
            }
        }
    }

    /// Post `address` to every registered peer. Returns how many accepted.
    pub async fn announce(&self, blockchain: &Blockchain, address: &str) -> usize {
        let peers = blockchain.nodes();
        let timeout = self.config.timeout;

        let results: Vec<(String, std::result::Result<(), PeerError>)> = stream::iter(peers)
            .map(|peer| async move {
                let result =
                    match tokio::time::timeout(timeout, self.client.announce(&peer, address)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(PeerError::Timeout { peer: peer.clone() }),
                    };
                (peer, result)
            })
            .buffered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        let mut accepted = 0;
        for (peer, result) in results {
            match result {
                Ok(()) => {
                    info!(%peer, "announced to node");
                    accepted += 1;
                }
                Err(e) => warn!(%peer, "cannot announce to node: {}", e),
            }
        }
        accepted
    }

    /// Fetch every peer's chain, in registry order.
    async fn fetch_all(
        &self,
        peers: Vec<String>,
    ) -> Vec<(String, std::result::Result<PeerChain, PeerError>)> {
        let timeout = self.config.timeout;
        stream::iter(peers)
            .map(|peer| async move {
                let result =
                    match tokio::time::timeout(timeout, self.client.fetch_chain(&peer)).await {
                        Ok(Ok(peer_chain)) => check_length(&peer, peer_chain),
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(PeerError::Timeout { peer: peer.clone() }),
                    };
                (peer, result)
            })
            .buffered(self.config.max_concurrent.max(1))
            .collect()
            .await
    }
}

fn check_length(peer: &str, peer_chain: PeerChain) -> std::result::Result<PeerChain, PeerError> {
    if peer_chain.length != peer_chain.chain.len() {
        return Err(PeerError::LengthMismatch {
            peer: peer.to_string(),
            reported: peer_chain.length,
            actual: peer_chain.chain.len(),
        });
    }
    Ok(peer_chain)
}

/// Pick the first chain, in iteration order, that is strictly longer than
/// everything seen so far (starting from `local_len`) and valid.
pub fn select_longest<I>(
    local_len: usize,
    candidates: I,
    validator: &ChainValidator,
) -> Option<Vec<Block>>
where
    I: IntoIterator<Item = Vec<Block>>,
{
    let mut max_len = local_len;
    let mut best = None;
    for chain in candidates {
        if chain.len() > max_len {
            match validator.validate(&chain) {
                Ok(()) => {
                    max_len = chain.len();
                    best = Some(chain);
                }
                Err(e) => debug!(length = chain.len(), "rejecting peer chain: {}", e),
            }
        }
    }
    best
}
