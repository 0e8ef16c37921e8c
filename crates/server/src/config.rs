//! Node configuration.
//!
//! Read from an optional JSON file; every field has a default so a partial
//! file (or none at all) is fine. Command-line flags override file values.

use clap::ValueEnum;
use powchain_chain::{Blockchain, BlockchainConfig, BlockchainError, ResolverConfig};
use powchain_storage::{FileLedger, FilePeers, LedgerStore, PeerStore, SledLedger, SledPeers, Storage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Ledger file name inside the data directory.
pub const LEDGER_FILE: &str = "ledger.txt";
/// Registry file name inside the data directory.
pub const NODES_FILE: &str = "nodes.txt";
/// sled database directory inside the data directory.
pub const SLED_DIR: &str = "db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the ledger and registry live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// `ledger.txt` and `nodes.txt`.
    #[default]
    File,
    /// A sled database.
    Sled,
}

/// Peer resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub max_concurrent: usize,
    /// Per-peer deadline. Values below 1 are raised to 1.
    pub timeout_secs: u64,
    /// Run resolution in the background this often. Off when unset.
    pub interval_secs: Option<u64>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        let defaults = ResolverConfig::default();
        Self {
            max_concurrent: defaults.max_concurrent,
            timeout_secs: defaults.timeout.as_secs(),
            interval_secs: None,
        }
    }
}

/// The privileged wallet-minting endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MintConfig {
    pub enabled: bool,
    /// Required in the `x-mint-token` header when set.
    pub token: Option<String>,
    /// Credited to every new wallet.
    pub amount: u64,
    /// RSA modulus size for generated wallets.
    pub key_bits: usize,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: None,
            amount: 1000,
            key_bits: powchain_core::crypto::DEFAULT_KEY_BITS,
        }
    }
}

/// Full node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub listen: SocketAddr,
    pub data_dir: PathBuf,
    pub backend: Backend,
    pub blockchain: BlockchainConfig,
    pub resolver: ResolverSettings,
    pub mint: MintConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            data_dir: PathBuf::from("./data"),
            backend: Backend::default(),
            blockchain: BlockchainConfig::default(),
            resolver: ResolverSettings::default(),
            mint: MintConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        let mut timeout_secs = self.resolver.timeout_secs;
        if timeout_secs == 0 {
            warn!("resolver timeout_secs is 0, using 1 second");
            timeout_secs = 1;
        }
        ResolverConfig {
            max_concurrent: self.resolver.max_concurrent,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Open the configured stores and start the engine on them.
    pub fn open_blockchain(&self) -> Result<Blockchain, BlockchainError> {
        let (ledger, peers): (Box<dyn LedgerStore>, Box<dyn PeerStore>) = match self.backend {
            Backend::File => (
                Box::new(FileLedger::open(self.data_dir.join(LEDGER_FILE))?),
                Box::new(FilePeers::open(self.data_dir.join(NODES_FILE))?),
            ),
            Backend::Sled => {
                let storage = Storage::open(self.data_dir.join(SLED_DIR))?;
                (
                    Box::new(SledLedger::new(storage.clone())),
                    Box::new(SledPeers::new(storage)),
                )
            }
        };
        Blockchain::open(ledger, peers, self.blockchain.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powchain_consensus::Difficulty;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = NodeConfig::from_json(
            r#"{"blockchain": {"difficulty": 3}, "mint": {"enabled": true}}"#,
        )
        .unwrap();

        assert_eq!(config.blockchain.difficulty, Difficulty(3));
        assert_eq!(config.blockchain.max_transactions_per_block, 5);
        assert!(config.mint.enabled);
        assert_eq!(config.mint.amount, 1000);
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.listen.port(), 5000);
    }

    #[test]
    fn test_backend_names() {
        let config = NodeConfig::from_json(r#"{"backend": "sled"}"#).unwrap();
        assert_eq!(config.backend, Backend::Sled);
        assert!(NodeConfig::from_json(r#"{"backend": "postgres"}"#).is_err());
    }

    #[test]
    fn test_resolver_config() {
        let config = NodeConfig::default();
        let resolver = config.resolver_config();
        assert_eq!(resolver.max_concurrent, 8);
        assert_eq!(resolver.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_timeout_is_raised() {
        let config =
            NodeConfig::from_json(r#"{"resolver": {"timeout_secs": 0}}"#).unwrap();
        assert_eq!(config.resolver_config().timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_load_reports_path() {
        let err = NodeConfig::load(Path::new("/nonexistent/powchain.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/powchain.json"));
    }

    #[test]
    fn test_open_blockchain_on_each_backend() {
        for backend in [Backend::File, Backend::Sled] {
            let dir = TempDir::new().unwrap();
            let config = NodeConfig {
                data_dir: dir.path().to_path_buf(),
                backend,
                ..NodeConfig::default()
            };

            let blockchain = config.open_blockchain().unwrap();
            assert!(blockchain.add_node("peer:1").unwrap());
            assert_eq!(blockchain.len(), 1);
            assert!(blockchain.latest_block().is_genesis());
        }
    }

    #[test]
    fn test_file_backend_layout() {
        let dir = TempDir::new().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().join("node"),
            ..NodeConfig::default()
        };

        let blockchain = config.open_blockchain().unwrap();
        blockchain.add_node("peer:1").unwrap();
        drop(blockchain);

        assert!(dir.path().join("node").join(LEDGER_FILE).exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("node").join(NODES_FILE)).unwrap(),
            "peer:1\n"
        );
        let reopened = config.open_blockchain().unwrap();
        assert_eq!(reopened.nodes(), vec!["peer:1".to_string()]);
    }
}
