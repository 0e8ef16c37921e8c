//! Blocks and the link to their predecessor.

use crate::hash::{sha256, to_canonical_json, Hash};
use crate::transaction::Transaction;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Sentinel stored in the genesis block's `previous_hash`.
pub const GENESIS_PREVIOUS_HASH: &str = "null";

/// Index of the genesis block.
pub const GENESIS_INDEX: u64 = 1;

/// What a block's `previous_hash` points at.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviousHash {
    /// The genesis block has no predecessor (`"null"` on the wire).
    Genesis,
    /// Hash of the previous block.
    Block(Hash),
}

impl PreviousHash {
    /// Whether this points at `hash`.
    pub fn links_to(&self, hash: &Hash) -> bool {
        matches!(self, PreviousHash::Block(h) if h == hash)
    }
}

impl fmt::Debug for PreviousHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviousHash::Genesis => f.write_str("PreviousHash(null)"),
            PreviousHash::Block(h) => write!(f, "PreviousHash({:?})", h),
        }
    }
}

impl fmt::Display for PreviousHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviousHash::Genesis => f.write_str(GENESIS_PREVIOUS_HASH),
            PreviousHash::Block(h) => write!(f, "{}", h),
        }
    }
}

impl Serialize for PreviousHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PreviousHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == GENESIS_PREVIOUS_HASH {
            return Ok(PreviousHash::Genesis);
        }
        Hash::from_hex(&s)
            .map(PreviousHash::Block)
            .map_err(serde::de::Error::custom)
    }
}

/// A sealed block. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, 1 for genesis.
    pub index: u64,
    /// Local wall-clock time the block was sealed.
    pub timestamp: String,
    /// Proof-of-work nonce.
    pub proof: u64,
    /// Link to the predecessor.
    pub previous_hash: PreviousHash,
    /// Transactions in admission order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create the genesis block.
    pub fn genesis() -> Self {
        Self {
            index: GENESIS_INDEX,
            timestamp: current_timestamp(),
            proof: 0,
            previous_hash: PreviousHash::Genesis,
            transactions: Vec::new(),
        }
    }

    /// Create the block that follows `previous`.
    ///
    /// The index saturates at `u64::MAX`; such a block never validates, so
    /// callers extending an arbitrary chain should check
    /// [`next_index`](Self::next_index) first.
    pub fn new(previous: &Block, proof: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            index: previous.index.saturating_add(1),
            timestamp: current_timestamp(),
            proof,
            previous_hash: PreviousHash::Block(previous.hash()),
            transactions,
        }
    }

    /// SHA-256 over the canonical JSON of every field.
    pub fn hash(&self) -> Hash {
        let encoded = to_canonical_json(self).expect("serialization should not fail");
        sha256(encoded.as_bytes())
    }

    /// Index of the block that would follow this one, if representable.
    pub fn next_index(&self) -> Option<u64> {
        self.index.checked_add(1)
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.index == GENESIS_INDEX && self.previous_hash == PreviousHash::Genesis
    }
}

/// Local time as `YYYY-MM-DD HH:MM:SS.ffffff`.
pub fn current_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_genesis() -> Block {
        Block {
            index: 1,
            timestamp: "2024-01-01 00:00:00.000000".to_string(),
            proof: 0,
            previous_hash: PreviousHash::Genesis,
            transactions: vec![],
        }
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, 0);
        assert!(genesis.transactions.is_empty());
    }

    #[test]
    fn test_block_links_to_previous() {
        let genesis = Block::genesis();
        let next = Block::new(&genesis, 42, vec![Transaction::new("a", "b", 1)]);

        assert_eq!(next.index, 2);
        assert!(next.previous_hash.links_to(&genesis.hash()));
        assert!(!next.is_genesis());
        assert_eq!(next.transactions.len(), 1);
    }

    #[test]
    fn test_block_hash_deterministic() {
        let block = Block::genesis();
        assert_eq!(block.hash(), block.hash());
    }

    #[test]
    fn test_block_hash_covers_every_field() {
        let base = fixed_genesis();

        let mut proof = base.clone();
        proof.proof = 1;
        let mut timestamp = base.clone();
        timestamp.timestamp.push('1');
        let mut txs = base.clone();
        txs.transactions.push(Transaction::new("a", "b", 1));

        assert_ne!(base.hash(), proof.hash());
        assert_ne!(base.hash(), timestamp.hash());
        assert_ne!(base.hash(), txs.hash());
    }

    #[test]
    fn test_canonical_encoding_of_block() {
        let mut block = fixed_genesis();
        block.transactions.push(Transaction::new("a", "b", 7));
        assert_eq!(
            to_canonical_json(&block).unwrap(),
            concat!(
                r#"{"index": 1, "previous_hash": "null", "proof": 0, "#,
                r#""timestamp": "2024-01-01 00:00:00.000000", "#,
                r#""transactions": [{"amount": 7, "receiver": "b", "sender": "a"}]}"#
            )
        );
    }

    #[test]
    fn test_previous_hash_wire_format() {
        let genesis = fixed_genesis();
        let value = serde_json::to_value(&genesis).unwrap();
        assert_eq!(value["previous_hash"], "null");

        let next = Block::new(&genesis, 5, vec![]);
        let value = serde_json::to_value(&next).unwrap();
        assert_eq!(value["previous_hash"], genesis.hash().to_hex());

        let parsed: Block = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, next);
    }

    #[test]
    fn test_bad_previous_hash_rejected() {
        let mut value = serde_json::to_value(fixed_genesis()).unwrap();
        value["previous_hash"] = "zz".into();
        assert!(serde_json::from_value::<Block>(value).is_err());
    }
}
