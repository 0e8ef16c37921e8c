//! Proof-of-work consensus rules for powchain.
//!
//! This crate provides:
//! - The proof-of-work puzzle (search and check)
//! - Transaction admission rules (keys, signature, balance)
//! - Chain validation (hash links and proofs)
//!
//! # Example
//!
//! ```rust
//! use powchain_consensus::{ChainValidator, Difficulty, ProofOfWork};
//! use powchain_core::Block;
//!
//! let pow = ProofOfWork::new(Difficulty(2));
//! let genesis = Block::genesis();
//! let proof = pow.solve(genesis.proof);
//! let next = Block::new(&genesis, proof, vec![]);
//!
//! assert!(ChainValidator::new(pow).is_valid(&[genesis, next]));
//! ```

pub mod pow;
pub mod validator;

// Re-export commonly used types
pub use pow::{Difficulty, ProofOfWork, DEFAULT_DIFFICULTY};
pub use validator::{ChainValidator, KeyRole, TransactionValidator, ValidationError};
