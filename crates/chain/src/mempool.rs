//! Transaction mempool for pending transactions.
//!
//! The mempool stores admitted transactions waiting to be included in a
//! block, in arrival order. Blocks always take a prefix of the queue.

use powchain_core::{Identity, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Errors that can occur during mempool operations.
#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the mempool.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

/// Transaction mempool.
///
/// Identical transactions are kept as separate entries.
#[derive(Debug)]
pub struct Mempool {
    /// Configuration.
    config: MempoolConfig,
    /// Pending transactions, oldest first.
    queue: VecDeque<Transaction>,
}

impl Mempool {
    /// Create a new mempool with default configuration.
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    /// Create a new mempool with the given configuration.
    pub fn with_config(config: MempoolConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
        }
    }

    /// Get the number of transactions in the mempool.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the mempool is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Append a transaction to the back of the queue.
    pub fn add(&mut self, tx: Transaction) -> Result<()> {
        if self.queue.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }
        self.queue.push_back(tx);
        Ok(())
    }

    /// The first `limit` transactions, without removing them.
    pub fn peek(&self, limit: usize) -> Vec<Transaction> {
        self.queue.iter().take(limit).cloned().collect()
    }

    /// Remove the first `count` transactions.
    pub fn drop_front(&mut self, count: usize) {
        let count = count.min(self.queue.len());
        self.queue.drain(..count);
    }

    /// Pending transactions touching `identity`, oldest first.
    pub fn involving(&self, identity: &Identity) -> Vec<Transaction> {
        self.iter()
            .filter(|tx| tx.involves(identity))
            .cloned()
            .collect()
    }

    /// Iterate over pending transactions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.queue.iter()
    }

    /// Get all transactions in the mempool.
    pub fn get_all(&self) -> Vec<Transaction> {
        self.iter().cloned().collect()
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}
