//! Transaction admission and chain validation rules.

use crate::pow::ProofOfWork;
use powchain_core::{Block, PublicKey, Signature, Transaction};
use std::fmt;
use thiserror::Error;

/// Which side of a transaction a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Sender,
    Receiver,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Sender => f.write_str("sender"),
            KeyRole::Receiver => f.write_str("receiver"),
        }
    }
}

/// Errors that can occur during validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid {role} key")]
    InvalidKey { role: KeyRole },

    #[error("transaction signature verification failed")]
    InvalidSignature,

    #[error("insufficient balance (required {required}, available {available})")]
    InsufficientBalance { required: u64, available: i128 },

    #[error("issuance from the root identity is disabled")]
    IssuanceDisabled,

    #[error("first block is not a genesis block")]
    InvalidGenesis,

    #[error("block {index} does not follow its predecessor's index")]
    InvalidIndex { index: u64 },

    #[error("block {index} previous_hash does not match its predecessor")]
    InvalidPreviousHash { index: u64 },

    #[error("block {index} proof fails the proof-of-work check")]
    InvalidProof { index: u64 },
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Transaction validator.
pub struct TransactionValidator;

impl TransactionValidator {
    /// Parse both parties as public keys, returning the sender's.
    pub fn validate_keys(tx: &Transaction) -> Result<PublicKey> {
        let sender = tx
            .sender
            .public_key()
            .map_err(|_| ValidationError::InvalidKey {
                role: KeyRole::Sender,
            })?;
        tx.receiver
            .public_key()
            .map_err(|_| ValidationError::InvalidKey {
                role: KeyRole::Receiver,
            })?;
        Ok(sender)
    }

    /// Verify the signature over the transaction's signing message.
    pub fn validate_signature(
        tx: &Transaction,
        sender_key: &PublicKey,
        signature: Option<&Signature>,
    ) -> Result<()> {
        let signature = signature.ok_or(ValidationError::InvalidSignature)?;
        tx.verify(sender_key, signature)
            .map_err(|_| ValidationError::InvalidSignature)
    }

    /// Check the sender can cover the amount from settled funds.
    pub fn validate_against_balance(tx: &Transaction, available: i128) -> Result<()> {
        if i128::from(tx.amount) > available {
            return Err(ValidationError::InsufficientBalance {
                required: tx.amount,
                available,
            });
        }
        Ok(())
    }

    /// Full admission check.
    ///
    /// Issuance from `"root"` skips the key, signature and balance checks
    /// when `allow_issuance` is set. The committed balance is only computed
    /// once the signature has been verified.
    pub fn validate_full(
        tx: &Transaction,
        signature: Option<&Signature>,
        allow_issuance: bool,
        committed_balance: impl FnOnce() -> i128,
    ) -> Result<()> {
        if tx.is_issuance() {
            return if allow_issuance {
                Ok(())
            } else {
                Err(ValidationError::IssuanceDisabled)
            };
        }

        let sender_key = Self::validate_keys(tx)?;
        Self::validate_signature(tx, &sender_key, signature)?;
        Self::validate_against_balance(tx, committed_balance())?;
        Ok(())
    }
}

/// Chain validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainValidator {
    pow: ProofOfWork,
}

impl ChainValidator {
    /// Create a validator checking proofs with `pow`.
    pub fn new(pow: ProofOfWork) -> Self {
        Self { pow }
    }

    /// Validate that `block` correctly extends `previous`.
    pub fn validate_link(&self, previous: &Block, block: &Block) -> Result<()> {
        if previous.index.checked_add(1) != Some(block.index) {
            return Err(ValidationError::InvalidIndex { index: block.index });
        }
        if !block.previous_hash.links_to(&previous.hash()) {
            return Err(ValidationError::InvalidPreviousHash { index: block.index });
        }
        if !self.pow.check(block.proof, previous.proof) {
            return Err(ValidationError::InvalidProof { index: block.index });
        }
        Ok(())
    }

    /// Validate a whole chain, stopping at the first fault.
    ///
    /// The first block must be a genesis block (index 1, no predecessor);
    /// every later block must extend the one before it. The empty chain is
    /// valid.
    pub fn validate(&self, chain: &[Block]) -> Result<()> {
        if let Some(first) = chain.first() {
            if !first.is_genesis() {
                return Err(ValidationError::InvalidGenesis);
            }
        }
        for pair in chain.windows(2) {
            self.validate_link(&pair[0], &pair[1])?;
        }
        Ok(())
    }

    /// Whether `chain` passes [`validate`](Self::validate).
    pub fn is_valid(&self, chain: &[Block]) -> bool {
        self.validate(chain).is_ok()
    }
}
