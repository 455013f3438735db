//! In-memory engine backed by an ordered map

use super::{Engine, Items, Keys};
use crate::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// A volatile engine that keeps everything in a [`BTreeMap`].
///
/// Unlike [`LogEngine`](super::LogEngine) it can seek, so it supports
/// [`Engine::keys_from`].
#[derive(Default)]
pub struct MemoryEngine {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for MemoryEngine {
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.entries.read().len() as u64)
    }

    fn items(&self) -> Items<'_> {
        let snapshot: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(snapshot.into_iter().map(Ok))
    }

    fn keys_from(&self, start: &[u8]) -> Option<Keys<'_>> {
        let keys: Vec<Vec<u8>> = self
            .entries
            .read()
            .range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
            .map(|(k, _)| k.clone())
            .collect();
        Some(Box::new(keys.into_iter().map(Ok)))
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}
