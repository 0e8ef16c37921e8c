//! Durable block storage.
//!
//! The file format is a sequence of pretty-printed JSON block records, each
//! terminated by `,`, with every record after the first preceded by a
//! newline and no surrounding brackets:
//!
//! ```text
//! {
//!     "index": 1,
//!     ...
//! },
//! {
//!     "index": 2,
//!     ...
//! },
//! ```

use crate::db::{BatchOp, Result, Storage, StorageError};
use powchain_core::Block;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Durable, append-only home of the chain.
pub trait LedgerStore: Send + Sync {
    /// Read every committed block in chain order.
    fn load(&mut self) -> Result<Vec<Block>>;

    /// Durably append one block.
    fn append(&mut self, block: &Block) -> Result<()>;

    /// Durably replace the whole chain.
    fn replace(&mut self, chain: &[Block]) -> Result<()>;
}

/// In-memory ledger for tests and throwaway nodes.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    blocks: Vec<Block>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger that already holds `blocks`.
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// The stored blocks.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

impl LedgerStore for MemoryLedger {
    fn load(&mut self) -> Result<Vec<Block>> {
        Ok(self.blocks.clone())
    }

    fn append(&mut self, block: &Block) -> Result<()> {
        self.blocks.push(block.clone());
        Ok(())
    }

    fn replace(&mut self, chain: &[Block]) -> Result<()> {
        self.blocks = chain.to_vec();
        Ok(())
    }
}

/// Flat-file ledger in the comma-terminated record format.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
}

/// Outcome of scanning a ledger file.
#[derive(Debug)]
pub struct ParsedLedger {
    /// Complete records, in file order.
    pub blocks: Vec<Block>,
    /// Length of the prefix holding exactly those records.
    pub valid_len: usize,
}

impl FileLedger {
    /// Open the ledger at `path`, creating an empty file if needed.
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

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a corrupt ledger is preserved before it is rewritten.
    pub fn corrupt_path(&self) -> PathBuf {
        sibling(&self.path, "corrupt")
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::io(&self.path, source)
    }
}

impl LedgerStore for FileLedger {
    fn load(&mut self) -> Result<Vec<Block>> {
        let data = fs::read(&self.path).map_err(|e| self.io_err(e))?;

        let parsed = match parse_records(&data) {
            Ok(parsed) => parsed,
            Err(err) => {
                let backup = self.corrupt_path();
                error!(path = %self.path.display(), backup = %backup.display(), "ledger is corrupt: {}", err);
                fs::copy(&self.path, &backup).map_err(|e| StorageError::io(&backup, e))?;
                return Err(err);
            }
        };

        if parsed.valid_len < data.len() {
            warn!(
                path = %self.path.display(),
                discarded = data.len() - parsed.valid_len,
                "discarding partial trailing ledger record"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .map_err(|e| self.io_err(e))?;
            file.set_len(parsed.valid_len as u64)
                .map_err(|e| self.io_err(e))?;
            file.sync_all().map_err(|e| self.io_err(e))?;
        }

        info!(path = %self.path.display(), blocks = parsed.blocks.len(), "loaded ledger");
        Ok(parsed.blocks)
    }

    fn append(&mut self, block: &Block) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        let previous_len = file.metadata().map_err(|e| self.io_err(e))?.len();

        let record = encode_record(block, previous_len == 0)?;
        let written = file
            .write_all(&record)
            .and_then(|()| file.sync_data());

        if let Err(e) = written {
            // Leave no partial record behind.
            if let Err(truncate_err) = file.set_len(previous_len) {
                warn!(path = %self.path.display(), "cannot roll back failed append: {}", truncate_err);
            }
            return Err(self.io_err(e));
        }
        Ok(())
    }

    fn replace(&mut self, chain: &[Block]) -> Result<()> {
        let mut data = Vec::new();
        for (i, block) in chain.iter().enumerate() {
            data.extend(encode_record(block, i == 0)?);
        }

        let tmp = sibling(&self.path, "tmp");
        let write_tmp = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()
        };
        write_tmp().map_err(|e| StorageError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }
}

/// Encode one block as a ledger record.
pub fn encode_record(block: &Block, first: bool) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if !first {
        out.push(b'\n');
    }
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    block.serialize(&mut serializer)?;
    out.push(b',');
    Ok(out)
}

/// Split ledger file contents into block records.
///
/// A record cut short by the end of the data (including one missing its
/// terminating comma) is treated as an interrupted write and left out of
/// `valid_len`. Anything else that fails to parse is a decode error.
pub fn parse_records(data: &[u8]) -> Result<ParsedLedger> {
    let mut blocks = Vec::new();
    let mut pos = 0;
    let mut valid_len = 0;

    loop {
        pos = skip_whitespace(data, pos);
        if pos == data.len() {
            // Only whitespace after the last record.
            valid_len = data.len();
            break;
        }

        let mut stream = serde_json::Deserializer::from_slice(&data[pos..]).into_iter::<Block>();
        match stream.next() {
            None => {
                valid_len = data.len();
                break;
            }
            Some(Ok(block)) => {
                let end = skip_whitespace(data, pos + stream.byte_offset());
                match data.get(end) {
                    Some(b',') => {
                        blocks.push(block);
                        pos = end + 1;
                        valid_len = pos;
                    }
                    None => break,
                    Some(_) => {
                        return Err(StorageError::Decode {
                            offset: end,
                            source: serde::de::Error::custom("expected ',' after record"),
                        });
                    }
                }
            }
            Some(Err(e)) if e.is_eof() => break,
            Some(Err(source)) => return Err(StorageError::Decode { offset: pos, source }),
        }
    }

    Ok(ParsedLedger { blocks, valid_len })
}

fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && data[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Ledger kept in a sled tree, one bincode record per block.
///
/// Blocks are keyed by their position in the chain, never by the index they
/// carry, so the stored chain always reloads with the same length and order.
#[derive(Clone)]
pub struct SledLedger {
    storage: Storage,
}

impl SledLedger {
    /// Wrap an open database.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn next_position(&self) -> Result<u64> {
        let last = self.storage.last_key_with_prefix(Storage::BLOCK_PREFIX)?;
        Ok(last
            .as_deref()
            .and_then(Storage::block_position)
            .map_or(1, |position| position.saturating_add(1)))
    }
}

impl LedgerStore for SledLedger {
    fn load(&mut self) -> Result<Vec<Block>> {
        self.storage.scan_prefix(Storage::BLOCK_PREFIX)
    }

    fn append(&mut self, block: &Block) -> Result<()> {
        let position = self.next_position()?;
        self.storage.put(Storage::block_key(position), block)?;
        self.storage.flush()
    }

    fn replace(&mut self, chain: &[Block]) -> Result<()> {
        let mut ops: Vec<BatchOp> = self
            .storage
            .keys_with_prefix(Storage::BLOCK_PREFIX)?
            .into_iter()
            .map(|key| BatchOp::Remove { key })
            .collect();
        for (position, block) in (1u64..).zip(chain) {
            ops.push(BatchOp::Insert {
                key: Storage::block_key(position),
                value: bincode::serialize(block)?,
            });
        }
        self.storage.batch(ops)?;
        self.storage.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powchain_core::Transaction;
    use tempfile::TempDir;

    fn chain(len: usize) -> Vec<Block> {
        let mut blocks = vec![Block::genesis()];
        while blocks.len() < len {
            let previous = blocks.last().unwrap();
            let tx = Transaction::issuance(format!("wallet-{}", blocks.len()), 1000);
            blocks.push(Block::new(previous, blocks.len() as u64 * 7, vec![tx]));
        }
        blocks
    }

    fn file_ledger(dir: &TempDir) -> FileLedger {
        FileLedger::open(dir.path().join("ledger.txt")).unwrap()
    }

    #[test]
    fn test_record_layout() {
        let blocks = chain(2);
        let first = String::from_utf8(encode_record(&blocks[0], true).unwrap()).unwrap();
        let second = String::from_utf8(encode_record(&blocks[1], false).unwrap()).unwrap();

        assert!(first.starts_with("{\n    \"index\": 1,"));
        assert!(first.ends_with("},"));
        assert!(second.starts_with("\n{"));
    }

    #[test]
    fn test_file_ledger_append_and_load() {
        let dir = TempDir::new().unwrap();
        let mut ledger = file_ledger(&dir);
        assert!(ledger.load().unwrap().is_empty());

        let blocks = chain(3);
        for block in &blocks {
            ledger.append(block).unwrap();
        }

        let mut reopened = file_ledger(&dir);
        assert_eq!(reopened.load().unwrap(), blocks);
    }

    #[test]
    fn test_reads_bracket_wrappable_format() {
        let blocks = chain(2);
        let mut data = encode_record(&blocks[0], true).unwrap();
        data.extend(encode_record(&blocks[1], false).unwrap());

        // The format is a JSON array once wrapped and stripped of its last comma.
        let text = String::from_utf8(data.clone()).unwrap();
        let wrapped = format!("[{}]", &text[..text.len() - 1]);
        let parsed: Vec<Block> = serde_json::from_str(&wrapped).unwrap();
        assert_eq!(parsed, blocks);

        assert_eq!(parse_records(&data).unwrap().blocks, blocks);
    }

    #[test]
    fn test_partial_trailing_record_is_discarded() {
        let dir = TempDir::new().unwrap();
        let mut ledger = file_ledger(&dir);
        let blocks = chain(3);
        for block in &blocks[..2] {
            ledger.append(block).unwrap();
        }
        let intact_len = fs::metadata(ledger.path()).unwrap().len();

        // Simulate a write cut off halfway through the third record.
        let record = encode_record(&blocks[2], false).unwrap();
        let mut file = OpenOptions::new().append(true).open(ledger.path()).unwrap();
        file.write_all(&record[..record.len() / 2]).unwrap();

        assert_eq!(ledger.load().unwrap(), blocks[..2].to_vec());
        assert_eq!(fs::metadata(ledger.path()).unwrap().len(), intact_len);

        // Appending after recovery yields a well-formed file.
        ledger.append(&blocks[2]).unwrap();
        assert_eq!(ledger.load().unwrap(), blocks);
    }

    #[test]
    fn test_record_missing_comma_is_partial() {
        let blocks = chain(2);
        let mut data = encode_record(&blocks[0], true).unwrap();
        let mut second = encode_record(&blocks[1], false).unwrap();
        second.pop();
        data.extend(second);

        let parsed = parse_records(&data).unwrap();
        assert_eq!(parsed.blocks, blocks[..1].to_vec());
        assert_eq!(parsed.valid_len, encode_record(&blocks[0], true).unwrap().len());
    }

    #[test]
    fn test_mid_file_corruption_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let mut ledger = file_ledger(&dir);
        let blocks = chain(2);

        let mut data = b"{\"index\": \"oops\"},".to_vec();
        data.extend(encode_record(&blocks[1], false).unwrap());
        fs::write(ledger.path(), &data).unwrap();

        let err = ledger.load().unwrap_err();
        assert!(err.is_decode());
        assert_eq!(fs::read(ledger.corrupt_path()).unwrap(), data);
    }

    #[test]
    fn test_garbage_between_records_is_decode_error() {
        let blocks = chain(2);
        let mut data = encode_record(&blocks[0], true).unwrap();
        data.pop();
        data.extend(b" x ");
        data.extend(encode_record(&blocks[1], false).unwrap());

        assert!(matches!(
            parse_records(&data),
            Err(StorageError::Decode { .. })
        ));
    }

    #[test]
    fn test_file_ledger_replace() {
        let dir = TempDir::new().unwrap();
        let mut ledger = file_ledger(&dir);
        for block in chain(2) {
            ledger.append(&block).unwrap();
        }

        let longer = chain(4);
        ledger.replace(&longer).unwrap();
        assert_eq!(ledger.load().unwrap(), longer);
        assert!(!dir.path().join("ledger.txt.tmp").exists());
    }

    #[test]
    fn test_sled_ledger_roundtrip_and_replace() {
        let storage = Storage::open_temporary().unwrap();
        let mut ledger = SledLedger::new(storage.clone());
        let blocks = chain(3);
        for block in &blocks {
            ledger.append(block).unwrap();
        }
        assert_eq!(SledLedger::new(storage.clone()).load().unwrap(), blocks);

        let shorter = chain(2);
        ledger.replace(&shorter).unwrap();
        assert_eq!(ledger.load().unwrap(), shorter);
    }

    #[test]
    fn test_sled_ledger_keys_by_position() {
        let storage = Storage::open_temporary().unwrap();
        let mut ledger = SledLedger::new(storage.clone());

        // Every non-genesis block claims the same index.
        let mut blocks = chain(4);
        for block in &mut blocks[1..] {
            block.index = 7;
        }
        ledger.replace(&blocks).unwrap();
        assert_eq!(SledLedger::new(storage.clone()).load().unwrap(), blocks);

        let extra = chain(5).pop().unwrap();
        ledger.append(&extra).unwrap();
        let reloaded = SledLedger::new(storage).load().unwrap();
        assert_eq!(reloaded.len(), 5);
        assert_eq!(reloaded[4], extra);
    }

    #[test]
    fn test_memory_ledger() {
        let mut ledger = MemoryLedger::new();
        let blocks = chain(2);
        ledger.append(&blocks[0]).unwrap();
        ledger.replace(&blocks).unwrap();
        assert_eq!(ledger.load().unwrap(), blocks);
        assert_eq!(ledger.blocks().len(), 2);
    }
}
