//! Main blockchain orchestration.
//!
//! This module brings together all components: consensus, storage, mempool
//! and the node registry, behind a single reader/writer lock.

use crate::mempool::{Mempool, MempoolConfig};
use powchain_consensus::{ChainValidator, Difficulty, ProofOfWork, TransactionValidator};
use powchain_core::{Block, Hash, Identity, SignedTransaction, Transaction};
use powchain_storage::{LedgerStore, NodeRegistry, PeerStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("storage error: {0}")]
    Storage(#[from] powchain_storage::StorageError),

    #[error("validation error: {0}")]
    Validation(#[from] powchain_consensus::ValidationError),

    #[error("mempool error: {0}")]
    Mempool(#[from] crate::mempool::MempoolError),

    #[error("block {index} cannot be extended: index overflow")]
    IndexOverflow { index: u64 },
}

impl BlockchainError {
    /// Whether the caller is at fault (bad input) rather than the node.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BlockchainError::Validation(_) | BlockchainError::Mempool(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Blockchain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// Proof-of-work difficulty (leading zero hex digits).
    pub difficulty: Difficulty,
    /// Maximum transactions per block.
    pub max_transactions_per_block: usize,
    /// Admit unsigned transactions from the `"root"` identity.
    pub allow_root_issuance: bool,
    /// Mempool configuration.
    pub mempool: MempoolConfig,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::default(),
            max_transactions_per_block: 5,
            allow_root_issuance: true,
            mempool: MempoolConfig::default(),
        }
    }
}

/// Committed balance of an identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// `income - outcome`.
    pub total: i128,
    /// Sum received.
    pub income: i128,
    /// Sum sent.
    pub outcome: i128,
}

/// Transactions touching an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Waiting in the mempool, oldest first.
    pub pending: Vec<Transaction>,
    /// Committed, in chain order.
    pub success: Vec<Transaction>,
}

/// The block a miner is building on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tip {
    pub index: u64,
    pub proof: u64,
    pub hash: Hash,
}

/// Blockchain statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BlockchainStats {
    /// Number of blocks, genesis included.
    pub length: usize,
    /// Hash of the latest block.
    pub tip_hash: Hash,
    /// Number of pending transactions.
    pub pending_transactions: usize,
    /// Number of known peers.
    pub nodes: usize,
}

/// Everything guarded by the engine lock.
struct State {
    chain: Vec<Block>,
    mempool: Mempool,
    registry: NodeRegistry,
    ledger: Box<dyn LedgerStore>,
}

impl State {
    fn tip(&self) -> &Block {
        // `open` seeds genesis and replacements are never shorter.
        self.chain.last().expect("chain always holds genesis")
    }

    fn next_index(&self) -> Result<u64> {
        let tip = self.tip();
        tip.next_index()
            .ok_or(BlockchainError::IndexOverflow { index: tip.index })
    }
}

/// Main blockchain struct that orchestrates all components.
///
/// Shared between request handlers behind an `Arc`. Queries take the read
/// lock; admission, commits, replacement and registry changes take the
/// write lock. Every mutation is persisted before memory changes.
pub struct Blockchain {
    state: RwLock<State>,
    pow: ProofOfWork,
    validator: ChainValidator,
    config: BlockchainConfig,
}

impl Blockchain {
    /// Open the engine over the given stores.
    ///
    /// An empty ledger is seeded with the genesis block. A ledger that
    /// cannot be decoded is replaced by a fresh genesis-only chain.
    pub fn open(
        mut ledger: Box<dyn LedgerStore>,
        peers: Box<dyn PeerStore>,
        config: BlockchainConfig,
    ) -> Result<Self> {
        let pow = ProofOfWork::new(config.difficulty);
        let validator = ChainValidator::new(pow);

        let chain = match ledger.load() {
            Ok(blocks) if blocks.is_empty() => {
                let genesis = Block::genesis();
                ledger.append(&genesis)?;
                info!("initialized ledger with genesis block");
                vec![genesis]
            }
            Ok(blocks) => {
                if let Err(e) = validator.validate(&blocks) {
                    warn!("loaded ledger does not validate: {}", e);
                }
                blocks
            }
            Err(e) if e.is_decode() => {
                error!("cannot decode ledger, starting from genesis: {}", e);
                let genesis = Block::genesis();
                ledger.replace(std::slice::from_ref(&genesis))?;
                vec![genesis]
            }
            Err(e) => return Err(e.into()),
        };

        let registry = NodeRegistry::open(peers)?;
        info!(
            blocks = chain.len(),
            nodes = registry.len(),
            difficulty = pow.difficulty().0,
            "blockchain opened"
        );

        Ok(Self {
            state: RwLock::new(State {
                chain,
                mempool: Mempool::with_config(config.mempool.clone()),
                registry,
                ledger,
            }),
            pow,
            validator,
            config,
        })
    }

    /// The configuration the engine was opened with.
    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    /// The proof-of-work rules in force.
    pub fn pow(&self) -> ProofOfWork {
        self.pow
    }

    /// The chain validator in force.
    pub fn validator(&self) -> ChainValidator {
        self.validator
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Copy of the whole chain.
    pub fn chain(&self) -> Vec<Block> {
        self.state.read().chain.clone()
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.state.read().chain.len()
    }

    /// Always false once opened.
    pub fn is_empty(&self) -> bool {
        self.state.read().chain.is_empty()
    }

    /// Copy of the latest block.
    pub fn latest_block(&self) -> Block {
        self.state.read().tip().clone()
    }

    /// The block new work builds on.
    pub fn tip(&self) -> Tip {
        let state = self.state.read();
        let tip = state.tip();
        Tip {
            index: tip.index,
            proof: tip.proof,
            hash: tip.hash(),
        }
    }

    /// Whether the local chain passes the chain validator.
    pub fn is_valid(&self) -> bool {
        self.validator.is_valid(&self.state.read().chain)
    }

    /// Pending transactions, oldest first.
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.read().mempool.get_all()
    }

    /// Committed balance of `identity`. Pending transactions do not count.
    pub fn balance(&self, identity: &Identity) -> Balance {
        balance_of(&self.state.read().chain, identity)
    }

    /// Committed and pending transactions touching `identity`.
    pub fn transactions_for(&self, identity: &Identity) -> History {
        let state = self.state.read();
        let success = state
            .chain
            .iter()
            .flat_map(|block| &block.transactions)
            .filter(|tx| tx.involves(identity))
            .cloned()
            .collect();
        History {
            pending: state.mempool.involving(identity),
            success,
        }
    }

    /// Get blockchain statistics.
    pub fn stats(&self) -> BlockchainStats {
        let state = self.state.read();
        BlockchainStats {
            length: state.chain.len(),
            tip_hash: state.tip().hash(),
            pending_transactions: state.mempool.len(),
            nodes: state.registry.len(),
        }
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Verify and admit a transaction.
    ///
    /// Returns the index of the block the transaction is expected to land in.
    pub fn submit_transaction(&self, submitted: SignedTransaction) -> Result<u64> {
        let SignedTransaction {
            transaction,
            signature,
        } = submitted;

        let mut state = self.state.write();
        TransactionValidator::validate_full(
            &transaction,
            signature.as_ref(),
            self.config.allow_root_issuance,
            || balance_of(&state.chain, &transaction.sender).total,
        )?;
        let next_index = state.next_index()?;

        debug!(amount = transaction.amount, "admitted transaction");
        state.mempool.add(transaction)?;
        Ok(next_index)
    }

    // =========================================================================
    // Mining
    // =========================================================================

    /// Mine one block on the current tip.
    ///
    /// The proof is searched without holding the lock; if another block
    /// lands first the work is discarded and the search restarts.
    pub fn mine(&self) -> Result<Block> {
        loop {
            let tip = self.tip();
            let proof = self.pow.solve(tip.proof);
            if let Some(block) = self.commit_mined(&tip, proof)? {
                return Ok(block);
            }
            debug!(index = tip.index, "tip moved while mining, retrying");
        }
    }

    /// Seal a block on `tip` with `proof` and the head of the mempool.
    ///
    /// Returns `None` without touching anything if `tip` is no longer the
    /// latest block.
    pub fn commit_mined(&self, tip: &Tip, proof: u64) -> Result<Option<Block>> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let latest = state.tip();
        if latest.index != tip.index || latest.hash() != tip.hash {
            return Ok(None);
        }
        state.next_index()?;

        let transactions = state.mempool.peek(self.config.max_transactions_per_block);
        let block = Block::new(latest, proof, transactions);

        state.ledger.append(&block)?;
        state.mempool.drop_front(block.transactions.len());
        state.chain.push(block.clone());

        info!(
            index = block.index,
            proof = block.proof,
            transactions = block.transactions.len(),
            "mined block"
        );
        Ok(Some(block))
    }

    // =========================================================================
    // Consensus
    // =========================================================================

    /// Install `candidate` if it is still strictly longer than the local
    /// chain. The caller has already validated it.
    pub(crate) fn adopt_validated_chain(&self, candidate: Vec<Block>) -> Result<bool> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if candidate.len() <= state.chain.len() {
            debug!(
                local = state.chain.len(),
                candidate = candidate.len(),
                "candidate chain no longer longer than local chain"
            );
            return Ok(false);
        }

        state.ledger.replace(&candidate)?;
        info!(
            from = state.chain.len(),
            to = candidate.len(),
            "replaced local chain with longer peer chain"
        );
        state.chain = candidate;
        Ok(true)
    }

    // =========================================================================
    // Node registry
    // =========================================================================

    /// Register a peer. Returns `false` if it was already known.
    pub fn add_node(&self, address: &str) -> Result<bool> {
        let added = self.state.write().registry.add(address)?;
        if added {
            info!(node = address, "registered node");
        }
        Ok(added)
    }

    /// Known peers in registration order.
    pub fn nodes(&self) -> Vec<String> {
        self.state.read().registry.list().to_vec()
    }

    pub fn node_count(&self) -> usize {
        self.state.read().registry.len()
    }
}

/// Committed balance of `identity` over `chain`.
pub fn balance_of(chain: &[Block], identity: &Identity) -> Balance {
    let mut balance = Balance::default();
    for tx in chain.iter().flat_map(|block| &block.transactions) {
        if &tx.sender == identity {
            balance.outcome += i128::from(tx.amount);
        }
        if &tx.receiver == identity {
            balance.income += i128::from(tx.amount);
        }
    }
    balance.total = balance.income - balance.outcome;
    balance
}
