//! Core ledger primitives for powchain.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - SHA-256 hashing and canonical JSON encoding
//! - RSA identities, keypairs and PSS signatures
//! - Transactions and their signing message
//! - Blocks and the hash link between them

pub mod block;
pub mod crypto;
pub mod hash;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{Block, PreviousHash, GENESIS_INDEX, GENESIS_PREVIOUS_HASH};
pub use crypto::{CryptoError, Identity, Keypair, PemLabel, PublicKey, Signature};
pub use hash::{sha256, to_canonical_json, Hash, H256};
pub use transaction::{MessageEncoding, SignedTransaction, Transaction};
