//! HTTP node for powchain.
//!
//! Wraps a [`Blockchain`](powchain_chain::Blockchain) in an axum router and
//! provides the HTTP transport the consensus resolver uses to reach peers.

pub mod config;
pub mod peer;
pub mod routes;

pub use config::{Backend, ConfigError, MintConfig, NodeConfig, ResolverSettings};
pub use peer::HttpPeerClient;
pub use routes::{router, ApiError, AppState};
