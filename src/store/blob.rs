//! The blob store contract

use crate::{Error, Result};
use std::ops::ControlFlow;

/// Arguments to [`BlobStore::put`]
#[derive(Clone, Copy, Debug)]
pub struct PutOptions<'a> {
    /// The key to write
    pub key: &'a str,
    /// The blob to store under `key`
    pub data: &'a [u8],
    /// Overwrite an existing value. When false, writing an existing key
    /// fails with [`Error::KeyExists`].
    pub replace: bool,
}

impl<'a> PutOptions<'a> {
    /// Create-only write of `data` under `key`
    pub fn new(key: &'a str, data: &'a [u8]) -> Self {
        PutOptions {
            key,
            data,
            replace: false,
        }
    }

    /// Allow the write to overwrite an existing value
    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }
}

/// A store of opaque blobs keyed by strings
pub trait BlobStore {
    /// Fetch the blob stored under `key`.
    ///
    /// Fails with [`Error::KeyNotFound`] if the key is absent.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Write a blob according to `opts`
    fn put(&self, opts: PutOptions<'_>) -> Result<()>;

    /// Remove `key`. Fails with [`Error::KeyNotFound`] if the key is absent.
    fn delete(&self, key: &str) -> Result<()>;

    /// Call `visit` with every key `>= start` in ascending order.
    ///
    /// Returning [`ControlFlow::Break`] from `visit` ends the listing
    /// successfully; returning an error ends it with that error.
    fn list<F, E>(&self, start: &str, visit: F) -> std::result::Result<(), E>
    where
        F: FnMut(&str) -> std::result::Result<ControlFlow<()>, E>,
        E: From<Error>;

    /// Number of keys in the store
    fn len(&self) -> Result<u64>;

    /// Whether the store holds no keys
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Flush and release the store
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
