//! sled database wrapper with serialization helpers.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot decode ledger record at byte {offset}: {source}")]
    Decode {
        offset: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Attach the path an I/O error happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether persisted data could not be decoded (as opposed to a failed
    /// read or write).
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            StorageError::Decode { .. } | StorageError::Serialization(_)
        )
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Wrapper around sled database with serialization helpers.
///
/// Cheap to clone; clones share the same database.
#[derive(Clone)]
pub struct Storage {
    db: sled::Db,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing).
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store a serializable value.
    pub fn put<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: serde::Serialize,
    {
        let encoded = bincode::serialize(value)?;
        self.db.insert(key, encoded)?;
        Ok(())
    }

    /// Retrieve and deserialize a value.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: serde::de::DeserializeOwned,
    {
        match self.db.get(key)? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Deserialize every value under `prefix`, in key order.
    pub fn scan_prefix<V>(&self, prefix: &[u8]) -> Result<Vec<V>>
    where
        V: serde::de::DeserializeOwned,
    {
        let mut values = Vec::new();
        for entry in self.db.scan_prefix(prefix) {
            let (_, bytes) = entry?;
            values.push(bincode::deserialize(&bytes)?);
        }
        Ok(values)
    }

    /// Keys stored under `prefix`, in key order.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for key in self.db.scan_prefix(prefix).keys() {
            keys.push(key?.to_vec());
        }
        Ok(keys)
    }

    /// Greatest key stored under `prefix`.
    pub fn last_key_with_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.db.scan_prefix(prefix).keys().next_back() {
            Some(key) => Ok(Some(key?.to_vec())),
            None => Ok(None),
        }
    }

    /// Apply multiple operations atomically.
    ///
    /// Note: Atomicity is provided by sled's `apply_batch`. The batch collects
    /// operations in memory, then `apply_batch` writes them atomically.
    pub fn batch(&self, operations: Vec<BatchOp>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for op in operations {
            match op {
                BatchOp::Insert { key, value } => batch.insert(key, value),
                BatchOp::Remove { key } => batch.remove(key),
            }
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Key Construction Helpers
    // =========================================================================

    /// Prefix shared by all block keys.
    pub const BLOCK_PREFIX: &'static [u8] = b"block:";

    /// Key holding the peer address list.
    pub const PEERS_KEY: &'static [u8] = b"peers";

    /// Create a prefixed key for the block at `position` (1 for genesis).
    /// Format: "block:" + big-endian position, so keys sort in chain order.
    pub fn block_key(position: u64) -> Vec<u8> {
        let mut key = Self::BLOCK_PREFIX.to_vec();
        key.extend_from_slice(&position.to_be_bytes());
        key
    }

    /// Inverse of [`block_key`](Self::block_key).
    pub fn block_position(key: &[u8]) -> Option<u64> {
        let bytes = key.strip_prefix(Self::BLOCK_PREFIX)?;
        Some(u64::from_be_bytes(bytes.try_into().ok()?))
    }
}

/// Batch operation for atomic updates.
pub enum BatchOp {
    Insert { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}
