//! Append-only log engine with an in-memory hash index
//!
//! The engine owns a directory holding a single log file:
//! ```text
//! [HEADER: 16 bytes]
//!   - magic: 8 bytes ("HASHSTOR")
//!   - version: 4 bytes (u32 LE)
//!   - reserved: 4 bytes
//!
//! [RECORDS: variable]
//!   - kind: 1 byte (1 = put, 2 = delete)
//!   - key_len: 4 bytes (u32 LE)
//!   - value_len: 4 bytes (u32 LE)
//!   - key, value
//!   - checksum: 8 bytes (BLAKE3 prefix)
//! ```
//!
//! The index maps every live key to the offset of its latest put record and
//! is rebuilt by replaying the log on open. Because the index is a hash map,
//! [`Engine::items`] visits keys in no particular order.

use super::maintenance::Maintenance;
use super::record::{self, Record, RecordKind, CHECKSUM_LEN, HEADER_SIZE, RECORD_PREFIX};
use super::{Engine, Items};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the log file inside the engine directory
pub const LOG_FILE_NAME: &str = "data.log";

const COMPACT_FILE_NAME: &str = "data.log.compact";

/// Tuning knobs for a [`LogEngine`]
#[derive(Clone, Debug, PartialEq)]
pub struct EngineOptions {
    /// Interval between background syncs. Zero disables background syncing.
    pub sync_interval: Duration,
    /// Interval between background compaction checks. Zero disables them.
    pub compaction_interval: Duration,
    /// Fraction of dead log bytes required before a background pass compacts
    pub min_fragmentation: f64,
    /// Flush every put and delete to stable storage before returning
    pub sync_on_write: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            sync_interval: Duration::from_secs(10),
            compaction_interval: Duration::from_secs(60),
            min_fragmentation: 0.2,
            sync_on_write: false,
        }
    }
}

impl EngineOptions {
    /// Set the background sync interval
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the background compaction interval
    pub fn with_compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = interval;
        self
    }

    /// Set the dead-byte fraction a background pass needs before compacting
    pub fn with_min_fragmentation(mut self, fraction: f64) -> Self {
        self.min_fragmentation = fraction;
        self
    }

    /// Sync after every write instead of relying on the background interval
    pub fn with_sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }
}

/// Point-in-time size information about a [`LogEngine`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EngineStats {
    /// Number of live keys
    pub keys: u64,
    /// Bytes of records in the log, excluding the header
    pub log_bytes: u64,
    /// Bytes held by superseded puts and tombstones
    pub dead_bytes: u64,
    /// `dead_bytes / log_bytes`, or zero for an empty log
    pub fragmentation: f64,
}

/// Outcome of a compaction pass
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompactionStats {
    /// Whether the log was rewritten
    pub compacted: bool,
    /// Records carried over into the new log
    pub live_records: u64,
    /// Bytes the log shrank by
    pub reclaimed_bytes: u64,
}

/// Location of a live record
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    len: u64,
}

/// In-memory index for fast lookups
struct Index {
    entries: HashMap<Vec<u8>, IndexEntry>,
    dead_bytes: u64,
}

impl Index {
    fn new() -> Self {
        Index {
            entries: HashMap::new(),
            dead_bytes: 0,
        }
    }

    fn apply(&mut self, record: &Record, entry: IndexEntry) {
        match record.kind {
            RecordKind::Put => {
                if let Some(old) = self.entries.insert(record.key.clone(), entry) {
                    self.dead_bytes += old.len;
                }
            }
            RecordKind::Delete => {
                if let Some(old) = self.entries.remove(&record.key) {
                    self.dead_bytes += old.len;
                }
                // The tombstone itself is garbage once applied
                self.dead_bytes += entry.len;
            }
        }
    }
}

/// The log file and its append position
struct LogFile {
    file: File,
    write_offset: u64,
    dirty: bool,
}

impl LogFile {
    fn append(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.write_offset;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.write_offset = offset + data.len() as u64;
        self.dirty = true;
        Ok(offset)
    }

    fn read_raw(&mut self, entry: IndexEntry) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut data = vec![0u8; entry.len as usize];
        self.file.read_exact(&mut data)?;
        Ok(data)
    }

    fn read_record(&mut self, key: &[u8], entry: IndexEntry) -> Result<Record> {
        let data = self.read_raw(entry)?;
        let record = record::decode(&data)?;
        if record.kind != RecordKind::Put || record.key != key {
            return Err(Error::Corruption(format!(
                "Index points at the wrong record at offset {}",
                entry.offset
            )));
        }
        Ok(record)
    }
}

/// State shared between the engine handle and its maintenance worker.
///
/// Locks are always taken index first, then file.
pub(crate) struct Shared {
    dir: PathBuf,
    index: RwLock<Index>,
    file: Mutex<LogFile>,
    min_fragmentation: f64,
    sync_on_write: bool,
}

impl Shared {
    fn append(&self, data: &[u8]) -> Result<u64> {
        let mut file = self.file.lock();
        let offset = file.append(data)?;
        if self.sync_on_write {
            file.file.sync_data()?;
            file.dirty = false;
        }
        Ok(offset)
    }

    /// Flush written records to stable storage
    pub(crate) fn sync(&self) -> Result<()> {
        let mut file = self.file.lock();
        if !file.dirty {
            return Ok(());
        }
        file.file.sync_data()?;
        file.dirty = false;
        Ok(())
    }

    /// Rewrite the log keeping only live records.
    ///
    /// Unless `force` is set, nothing happens while fragmentation is below
    /// the configured threshold.
    pub(crate) fn compact(&self, force: bool) -> Result<CompactionStats> {
        let mut index = self.index.write();
        let mut file = self.file.lock();

        let log_bytes = file.write_offset - HEADER_SIZE;
        let fragmentation = fragmentation(index.dead_bytes, log_bytes);
        if index.dead_bytes == 0 || (!force && fragmentation < self.min_fragmentation) {
            return Ok(CompactionStats {
                compacted: false,
                live_records: index.entries.len() as u64,
                reclaimed_bytes: 0,
            });
        }

        let tmp_path = self.dir.join(COMPACT_FILE_NAME);
        let rewritten = match rewrite_live(&tmp_path, &index, &mut file) {
            Ok(rewritten) => rewritten,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };
        fs::rename(&tmp_path, self.dir.join(LOG_FILE_NAME))?;
        sync_dir(&self.dir)?;

        let reclaimed_bytes = file.write_offset - rewritten.write_offset;
        let live_records = rewritten.entries.len() as u64;
        index.entries = rewritten.entries;
        index.dead_bytes = 0;
        *file = LogFile {
            file: rewritten.file,
            write_offset: rewritten.write_offset,
            dirty: false,
        };

        info!(
            dir = %self.dir.display(),
            live_records,
            reclaimed_bytes,
            "compacted log"
        );
        Ok(CompactionStats {
            compacted: true,
            live_records,
            reclaimed_bytes,
        })
    }

    fn stats(&self) -> EngineStats {
        let index = self.index.read();
        let file = self.file.lock();
        let log_bytes = file.write_offset - HEADER_SIZE;
        EngineStats {
            keys: index.entries.len() as u64,
            log_bytes,
            dead_bytes: index.dead_bytes,
            fragmentation: fragmentation(index.dead_bytes, log_bytes),
        }
    }
}

fn fragmentation(dead_bytes: u64, log_bytes: u64) -> f64 {
    if log_bytes == 0 {
        0.0
    } else {
        dead_bytes as f64 / log_bytes as f64
    }
}

/// Persist directory entries so a rename survives a crash
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

struct Rewritten {
    file: File,
    entries: HashMap<Vec<u8>, IndexEntry>,
    write_offset: u64,
}

/// Copy every live record into a fresh log at `tmp_path`
fn rewrite_live(tmp_path: &Path, index: &Index, old: &mut LogFile) -> Result<Rewritten> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp_path)?;
    file.write_all(&record::encode_header())?;

    let mut entries = HashMap::with_capacity(index.entries.len());
    let mut write_offset = HEADER_SIZE;
    for (key, entry) in &index.entries {
        let data = old.read_raw(*entry)?;
        // Refuse to carry corrupt records into the new log
        record::decode(&data)?;
        file.write_all(&data)?;
        entries.insert(
            key.clone(),
            IndexEntry {
                offset: write_offset,
                len: entry.len,
            },
        );
        write_offset += entry.len;
    }
    file.sync_all()?;

    Ok(Rewritten {
        file,
        entries,
        write_offset,
    })
}

/// A key/value engine backed by an append-only log in a single directory
pub struct LogEngine {
    shared: Arc<Shared>,
    maintenance: Option<Maintenance>,
    closed: bool,
}

impl LogEngine {
    /// Open the engine in `dir`, creating the directory and log if needed.
    ///
    /// A torn final record left by a crash is truncated away. Damage anywhere
    /// else fails with [`Error::Corruption`] without modifying the log.
    pub fn open(dir: impl AsRef<Path>, options: &EngineOptions) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        // Leftover from an interrupted compaction; the log itself is intact
        let tmp_path = dir.join(COMPACT_FILE_NAME);
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let path = dir.join(LOG_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        if file_len == 0 {
            file.write_all(&record::encode_header())?;
            file.sync_all()?;
        } else if file_len < HEADER_SIZE {
            return Err(Error::InvalidFile("Truncated header".into()));
        } else {
            let mut header = [0u8; HEADER_SIZE as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            record::check_header(&header)?;
        }

        let file_len = file_len.max(HEADER_SIZE);
        let (index, write_offset) = replay(&mut file, file_len)?;
        if write_offset < file_len {
            warn!(
                path = %path.display(),
                offset = write_offset,
                dropped_bytes = file_len - write_offset,
                "truncating torn log tail"
            );
            file.set_len(write_offset)?;
            file.sync_all()?;
        }

        debug!(
            path = %path.display(),
            keys = index.entries.len(),
            dead_bytes = index.dead_bytes,
            "opened log engine"
        );

        let shared = Arc::new(Shared {
            dir,
            index: RwLock::new(index),
            file: Mutex::new(LogFile {
                file,
                write_offset,
                dirty: false,
            }),
            min_fragmentation: options.min_fragmentation,
            sync_on_write: options.sync_on_write,
        });
        let maintenance = Maintenance::spawn(
            Arc::clone(&shared),
            options.sync_interval,
            options.compaction_interval,
        )?;

        Ok(LogEngine {
            shared,
            maintenance,
            closed: false,
        })
    }

    /// Flush written records to stable storage
    pub fn sync(&self) -> Result<()> {
        self.shared.sync()
    }

    /// Rewrite the log without superseded records and tombstones
    pub fn compact(&self) -> Result<CompactionStats> {
        self.shared.compact(true)
    }

    /// Current size information
    pub fn stats(&self) -> EngineStats {
        self.shared.stats()
    }

    /// The directory holding the log
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    fn shutdown(&mut self) -> Result<()> {
        self.closed = true;
        if let Some(maintenance) = self.maintenance.take() {
            maintenance.stop();
        }
        self.shared.sync()
    }
}

impl Engine for LogEngine {
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.shared.index.read().entries.contains_key(key))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        // Hold the index lock while reading so compaction cannot move the record
        let index = self.shared.index.read();
        let Some(entry) = index.entries.get(key).copied() else {
            return Ok(None);
        };
        let record = self.shared.file.lock().read_record(key, entry)?;
        Ok(Some(record.value))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let data = record::encode(RecordKind::Put, key, value)?;
        let mut index = self.shared.index.write();
        let offset = self.shared.append(&data)?;
        let len = data.len() as u64;
        if let Some(old) = index.entries.insert(key.to_vec(), IndexEntry { offset, len }) {
            index.dead_bytes += old.len;
        }
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let data = record::encode(RecordKind::Delete, key, &[])?;
        let mut index = self.shared.index.write();
        if !index.entries.contains_key(key) {
            return Ok(());
        }
        self.shared.append(&data)?;
        if let Some(old) = index.entries.remove(key) {
            index.dead_bytes += old.len + data.len() as u64;
        }
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.shared.index.read().entries.len() as u64)
    }

    fn items(&self) -> Items<'_> {
        let keys: Vec<Vec<u8>> = self.shared.index.read().entries.keys().cloned().collect();
        Box::new(LogItems {
            shared: &self.shared,
            keys: keys.into_iter(),
        })
    }

    fn close(mut self) -> Result<()> {
        self.shutdown()
    }
}

impl Drop for LogEngine {
    fn drop(&mut self) {
        if !self.closed {
            // Best-effort sync on drop
            let _ = self.shutdown();
        }
    }
}

/// Full scan over a snapshot of the keys present when the scan started.
///
/// Keys deleted after the snapshot are skipped; values are read as of the
/// moment each key is reached.
struct LogItems<'a> {
    shared: &'a Shared,
    keys: std::vec::IntoIter<Vec<u8>>,
}

impl Iterator for LogItems<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        for key in self.keys.by_ref() {
            let index = self.shared.index.read();
            let Some(entry) = index.entries.get(&key).copied() else {
                continue;
            };
            let result = self.shared.file.lock().read_record(&key, entry);
            return Some(result.map(|record| (key, record.value)));
        }
        None
    }
}

/// Rebuild the index from the log. Returns the index and the end of the last
/// intact record.
///
/// Only the final record may be damaged, since that is all a crash during an
/// append can leave behind. A bad record with intact data after it is
/// reported as `Corruption` and the file is left untouched.
fn replay(file: &mut File, file_len: u64) -> Result<(Index, u64)> {
    let mut index = Index::new();
    file.seek(SeekFrom::Start(HEADER_SIZE))?;
    let mut reader = BufReader::new(file);

    let mut offset = HEADER_SIZE;
    while offset < file_len {
        let Some((record, len)) = read_next(&mut reader, offset, file_len - offset)? else {
            break;
        };
        index.apply(&record, IndexEntry { offset, len });
        offset += len;
    }
    Ok((index, offset))
}

/// Read the record at `offset`, or `None` if the remaining bytes are a torn
/// tail
fn read_next(
    reader: &mut impl Read,
    offset: u64,
    remaining: u64,
) -> Result<Option<(Record, u64)>> {
    if remaining < (RECORD_PREFIX + CHECKSUM_LEN) as u64 {
        return Ok(None);
    }

    let mut prefix_buf = [0u8; RECORD_PREFIX];
    reader.read_exact(&mut prefix_buf)?;
    let Some(prefix) = record::decode_prefix(&prefix_buf) else {
        // A zero-filled tail is what a crash leaves after the file grew but
        // before the data reached disk
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest)?;
        if prefix_buf.iter().chain(&rest).all(|&b| b == 0) {
            return Ok(None);
        }
        return Err(Error::Corruption(format!(
            "Unknown record kind {} at offset {offset}",
            prefix_buf[0]
        )));
    };
    let len = prefix.record_len();
    if len > remaining {
        return Ok(None);
    }

    let mut data = vec![0u8; len as usize];
    data[..RECORD_PREFIX].copy_from_slice(&prefix_buf);
    reader.read_exact(&mut data[RECORD_PREFIX..])?;
    match record::decode(&data) {
        Ok(record) => Ok(Some((record, len))),
        Err(Error::Corruption(_)) if len == remaining => Ok(None),
        Err(Error::Corruption(reason)) => Err(Error::Corruption(format!(
            "{reason} at offset {offset}, followed by {} more bytes",
            remaining - len
        ))),
        Err(e) => Err(e),
    }
}
