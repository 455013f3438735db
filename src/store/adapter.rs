//! Blob store adapter over a raw [`Engine`]
//!
//! Engines only offer unconditional writes and unordered scans. [`Store`]
//! adds existence checks for create-only writes and not-found reporting, and
//! sorts scan results to provide ordered, resumable listing.
//!
//! The existence check and the write that follows it are separate engine
//! calls, so concurrent writers to the same key can race between them.

use super::blob::{BlobStore, PutOptions};
use crate::engine::{Engine, EngineOptions, LogEngine};
use crate::{Error, Result};
use std::ops::ControlFlow;
use std::path::Path;
use tracing::debug;

/// Options for opening a [`Store`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options {
    /// Options specific to the underlying engine
    pub engine: EngineOptions,
}

/// A [`BlobStore`] backed by a single engine instance
pub struct Store<E: Engine = LogEngine> {
    engine: E,
}

impl Store<LogEngine> {
    /// Open a store on the log engine in directory `path`
    pub fn open(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        Ok(Store::new(LogEngine::open(path, &options.engine)?))
    }
}

impl<E: Engine> Store<E> {
    /// Wrap an already open engine
    pub fn new(engine: E) -> Self {
        Store { engine }
    }

    /// Access the underlying engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Collect every key `>= start` from a full scan and sort them
    fn sorted_keys_from(&self, start: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.engine.items() {
            let (key, _) = item?;
            if key.as_slice() < start.as_bytes() {
                continue;
            }
            keys.push(decode_key(key)?);
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

fn decode_key(key: Vec<u8>) -> Result<String> {
    String::from_utf8(key).map_err(|e| {
        Error::Corruption(format!(
            "Key is not valid UTF-8: {}",
            hex::encode(e.as_bytes())
        ))
    })
}

impl<G: Engine> BlobStore for Store<G> {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let bkey = key.as_bytes();
        if !self.engine.has(bkey)? {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        self.engine
            .get(bkey)?
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    fn put(&self, opts: PutOptions<'_>) -> Result<()> {
        let bkey = opts.key.as_bytes();
        if self.engine.has(bkey)? && !opts.replace {
            return Err(Error::KeyExists(opts.key.to_string()));
        }
        self.engine.put(bkey, opts.data)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let bkey = key.as_bytes();
        if !self.engine.has(bkey)? {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        self.engine.delete(bkey)
    }

    fn list<F, E>(&self, start: &str, mut visit: F) -> std::result::Result<(), E>
    where
        F: FnMut(&str) -> std::result::Result<ControlFlow<()>, E>,
        E: From<Error>,
    {
        if let Some(keys) = self.engine.keys_from(start.as_bytes()) {
            for key in keys {
                let key = decode_key(key?)?;
                if visit(key.as_str())?.is_break() {
                    break;
                }
            }
            return Ok(());
        }

        // No seek support: the whole keyspace at or after start is held in
        // memory before the first visit.
        let keys = self.sorted_keys_from(start)?;
        debug!(start, keys = keys.len(), "listing from full scan");
        for key in &keys {
            if visit(key.as_str())?.is_break() {
                break;
            }
        }
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        self.engine.count()
    }

    fn close(self) -> Result<()> {
        self.engine.close()
    }
}
