//! Proof-of-work puzzle.
//!
//! A proof `n` is valid after a block with proof `p` when the SHA-256 hex
//! digest of the decimal text of `n² − p²` starts with `difficulty` zero
//! characters. The difference is signed: `"-15"` is hashed, not `"15"`.

use powchain_core::{sha256, Hash};
use serde::{Deserialize, Serialize};

/// Default number of leading zero hex characters.
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Number of leading `'0'` hex characters a proof digest must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difficulty(pub usize);

impl Default for Difficulty {
    fn default() -> Self {
        Self(DEFAULT_DIFFICULTY)
    }
}

/// Proof-of-work search and verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: Difficulty,
}

impl ProofOfWork {
    /// Create a proof-of-work engine with the given difficulty.
    pub fn new(difficulty: Difficulty) -> Self {
        Self { difficulty }
    }

    /// Get the difficulty.
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Find the smallest positive proof that satisfies [`check`](Self::check).
    ///
    /// CPU-bound and blocking. Does not fail.
    pub fn solve(&self, previous_proof: u64) -> u64 {
        let mut proof = 1u64;
        while !self.check(proof, previous_proof) {
            proof += 1;
        }
        proof
    }

    /// Whether `proof` is a valid successor of `previous_proof`.
    pub fn check(&self, proof: u64, previous_proof: u64) -> bool {
        puzzle_digest(proof, previous_proof).leading_zero_nibbles() >= self.difficulty.0
    }
}

/// The decimal text of `proof² − previous_proof²`.
pub fn puzzle_input(proof: u64, previous_proof: u64) -> String {
    let a = (proof as u128) * (proof as u128);
    let b = (previous_proof as u128) * (previous_proof as u128);
    if a >= b {
        (a - b).to_string()
    } else {
        format!("-{}", b - a)
    }
}

/// The digest the difficulty predicate is evaluated on.
pub fn puzzle_digest(proof: u64, previous_proof: u64) -> Hash {
    sha256(puzzle_input(proof, previous_proof).as_bytes())
}
