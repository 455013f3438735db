//! Backing key/value engines
//!
//! An [`Engine`] is the raw primitive the blob store is built on: point
//! lookups, unconditional writes, a key count and a full scan. Engines make
//! no promise about the order of [`Engine::items`], and writes never check
//! whether the key already exists.
//!
//! Two engines ship with the crate:
//!
//! - [`LogEngine`]: an append-only record log with an in-memory hash index.
//! - [`MemoryEngine`]: an ordered map, mostly useful for tests.

mod log;
mod maintenance;
mod memory;
mod record;

pub use log::{CompactionStats, EngineOptions, EngineStats, LogEngine, LOG_FILE_NAME};
pub use memory::MemoryEngine;

use crate::Result;

/// A lazy sequence of `(key, value)` pairs produced by a full scan
pub type Items<'a> = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + Send + 'a>;

/// A lazy sequence of keys in ascending byte order
pub type Keys<'a> = Box<dyn Iterator<Item = Result<Vec<u8>>> + Send + 'a>;

/// The key/value primitive wrapped by [`Store`](crate::Store).
///
/// Implementations must be safe to share between threads; any locking the
/// engine needs is its own business.
pub trait Engine: Send + Sync {
    /// Check whether `key` is present
    fn has(&self, key: &[u8]) -> Result<bool>;

    /// Fetch the value for `key`, or `None` if it is absent
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, overwriting any previous value
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Number of keys currently present
    fn count(&self) -> Result<u64>;

    /// Scan every `(key, value)` pair in unspecified order.
    ///
    /// Each call starts a fresh scan.
    fn items(&self) -> Items<'_>;

    /// Scan keys `>= start` in ascending order.
    ///
    /// Engines that cannot seek return `None`, which is the default.
    fn keys_from(&self, start: &[u8]) -> Option<Keys<'_>> {
        let _ = start;
        None
    }

    /// Flush and release the engine
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
