//! Blockchain orchestration for powchain.
//!
//! This crate brings together all components to create a working node:
//! - **Mempool**: FIFO pool of admitted transactions
//! - **Blockchain**: admission, mining, balance queries and persistence
//! - **Resolver**: longest-valid-chain consensus across registered peers
//!
//! # Example
//!
//! ```rust
//! use powchain_chain::{Blockchain, BlockchainConfig};
//! use powchain_consensus::Difficulty;
//! use powchain_core::{SignedTransaction, Transaction};
//! use powchain_storage::{MemoryLedger, MemoryPeers};
//!
//! let config = BlockchainConfig {
//!     difficulty: Difficulty(2),
//!     ..BlockchainConfig::default()
//! };
//! let blockchain = Blockchain::open(
//!     Box::new(MemoryLedger::new()),
//!     Box::new(MemoryPeers::new()),
//!     config,
//! )
//! .unwrap();
//!
//! let mint = Transaction::issuance("wallet", 1000);
//! blockchain.submit_transaction(SignedTransaction::unsigned(mint)).unwrap();
//!
//! let block = blockchain.mine().unwrap();
//! assert_eq!(block.index, 2);
//! assert!(blockchain.is_valid());
//! ```

pub mod blockchain;
pub mod mempool;
pub mod resolver;

// Re-export commonly used types
pub use blockchain::{
    balance_of, Balance, Blockchain, BlockchainConfig, BlockchainError, BlockchainStats, History,
    Tip,
};
pub use mempool::{Mempool, MempoolConfig, MempoolError};
pub use resolver::{
    select_longest, ConsensusResolver, PeerChain, PeerClient, PeerError, ResolverConfig,
};
