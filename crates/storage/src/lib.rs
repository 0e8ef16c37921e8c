//! Persistent storage layer for powchain.
//!
//! This crate provides the durable homes of node state:
//! - The ledger (the committed chain), as a flat file or in sled
//! - The peer registry (known node addresses)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Layer                     │
//! │              (Blockchain engine, resolver)               │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                   Storage Layer                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │ LedgerStore │  │ PeerStore   │  │ Storage (DB)    │  │
//! │  │  - File     │  │  - File     │  │  - sled wrapper │  │
//! │  │  - Sled     │  │  - Sled     │  │  - serialization│  │
//! │  │  - Memory   │  │  - Memory   │  │  - key helpers  │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use powchain_core::Block;
//! use powchain_storage::{FileLedger, LedgerStore};
//!
//! let mut ledger = FileLedger::open("./data/ledger.txt").unwrap();
//! if ledger.load().unwrap().is_empty() {
//!     ledger.append(&Block::genesis()).unwrap();
//! }
//! ```

pub mod db;
pub mod ledger;
pub mod registry;

// Re-export commonly used types
pub use db::{BatchOp, Result, Storage, StorageError};
pub use ledger::{FileLedger, LedgerStore, MemoryLedger, SledLedger};
pub use registry::{FilePeers, MemoryPeers, NodeRegistry, PeerStore, SledPeers};
