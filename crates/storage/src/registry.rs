//! Peer registry persistence.

use crate::db::{Result, Storage, StorageError};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable home of the peer address list.
pub trait PeerStore: Send + Sync {
    /// Read every stored address in insertion order.
    fn load(&mut self) -> Result<Vec<String>>;

    /// Durably record a newly added address.
    fn append(&mut self, address: &str) -> Result<()>;
}

/// Peers kept only in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryPeers {
    addresses: Vec<String>,
}

impl MemoryPeers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeerStore for MemoryPeers {
    fn load(&mut self) -> Result<Vec<String>> {
        Ok(self.addresses.clone())
    }

    fn append(&mut self, address: &str) -> Result<()> {
        self.addresses.push(address.to_string());
        Ok(())
    }
}

/// One address per line in a plain text file.
#[derive(Debug)]
pub struct FilePeers {
    path: PathBuf,
}

impl FilePeers {
    /// Open the peer file at `path`, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PeerStore for FilePeers {
    fn load(&mut self) -> Result<Vec<String>> {
        let text = fs::read_to_string(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn append(&mut self, address: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        writeln!(file, "{}", address)
            .and_then(|()| file.sync_data())
            .map_err(|e| StorageError::io(&self.path, e))
    }
}

/// Peers kept under a single key in a sled database.
#[derive(Clone)]
pub struct SledPeers {
    storage: Storage,
}

impl SledPeers {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

impl PeerStore for SledPeers {
    fn load(&mut self) -> Result<Vec<String>> {
        Ok(self
            .storage
            .get::<_, Vec<String>>(Storage::PEERS_KEY)?
            .unwrap_or_default())
    }

    fn append(&mut self, address: &str) -> Result<()> {
        let mut addresses = self.load()?;
        addresses.push(address.to_string());
        self.storage.put(Storage::PEERS_KEY, &addresses)?;
        self.storage.flush()
    }
}

/// Deduplicated, insertion-ordered set of peer addresses.
///
/// Addresses are opaque `host:port` strings. The registry never shrinks.
pub struct NodeRegistry {
    order: Vec<String>,
    known: HashSet<String>,
    store: Box<dyn PeerStore>,
}

impl NodeRegistry {
    /// Load the registry from `store`, dropping duplicate entries.
    pub fn open(mut store: Box<dyn PeerStore>) -> Result<Self> {
        let mut registry = Self {
            order: Vec::new(),
            known: HashSet::new(),
            store: Box::new(MemoryPeers::new()),
        };
        for address in store.load()? {
            registry.insert(address);
        }
        registry.store = store;
        debug!(peers = registry.len(), "loaded node registry");
        Ok(registry)
    }

    /// Add `address`, persisting it first. Returns `false` if it was
    /// already known.
    pub fn add(&mut self, address: &str) -> Result<bool> {
        if self.known.contains(address) {
            return Ok(false);
        }
        self.store.append(address)?;
        self.insert(address.to_string());
        Ok(true)
    }

    /// Every known address in insertion order.
    pub fn list(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, address: &str) -> bool {
        self.known.contains(address)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, address: String) {
        if self.known.insert(address.clone()) {
            self.order.push(address);
        }
    }
}
