//! HTTP transport to other nodes.

use async_trait::async_trait;
use powchain_chain::{PeerChain, PeerClient, PeerError};
use serde::Serialize;

/// Talks to peers over their JSON API.
///
/// Deadlines are applied by the resolver, not here.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ConnectNode<'a> {
    node: &'a str,
}

impl HttpPeerClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// Base URL for a registry entry. Bare `host:port` entries mean plain HTTP.
pub fn peer_url(peer: &str, path: &str) -> String {
    let peer = peer.trim_end_matches('/');
    if peer.starts_with("http://") || peer.starts_with("https://") {
        format!("{}{}", peer, path)
    } else {
        format!("http://{}{}", peer, path)
    }
}

fn transport_error(peer: &str, err: reqwest::Error) -> PeerError {
    if err.is_timeout() {
        PeerError::Timeout {
            peer: peer.to_string(),
        }
    } else if err.is_decode() {
        PeerError::Malformed {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    } else {
        PeerError::Unreachable {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    }
}

fn check_status(peer: &str, response: &reqwest::Response) -> Result<(), PeerError> {
    let status = response.status();
    if !status.is_success() {
        return Err(PeerError::Unreachable {
            peer: peer.to_string(),
            reason: format!("HTTP {}", status),
        });
    }
    Ok(())
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<PeerChain, PeerError> {
        let response = self
            .http
            .get(peer_url(peer, "/get_chain"))
            .send()
            .await
            .map_err(|e| transport_error(peer, e))?;
        check_status(peer, &response)?;

        let body = response.bytes().await.map_err(|e| transport_error(peer, e))?;
        serde_json::from_slice(&body).map_err(|e| PeerError::Malformed {
            peer: peer.to_string(),
            reason: e.to_string(),
        })
    }

    async fn announce(&self, peer: &str, address: &str) -> Result<(), PeerError> {
        let response = self
            .http
            .post(peer_url(peer, "/connect_node"))
            .json(&ConnectNode { node: address })
            .send()
            .await
            .map_err(|e| transport_error(peer, e))?;
        check_status(peer, &response)
    }
}
