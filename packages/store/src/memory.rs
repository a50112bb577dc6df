//! In-memory store, mostly for tests and benchmarks.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::traits::KeyValueStore;

/// Ordered in-memory store. Contents are lost on close.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: BTreeMap<Bytes, Bytes>,
    closed: bool,
}

impl MemoryStore {
    pub const ENGINE_NAME: &'static str = "memory";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        self.check_open()?;
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        self.check_open()?;
        self.data.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        match self.data.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::KeyNotFound {
                key: Bytes::copy_from_slice(key),
            }),
        }
    }

    fn keys(&mut self) -> Result<Vec<Bytes>> {
        self.check_open()?;
        Ok(self.data.keys().cloned().collect())
    }

    fn first_key(&mut self) -> Result<Option<Bytes>> {
        self.check_open()?;
        Ok(self.data.keys().next().cloned())
    }

    fn next_key(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        self.check_open()?;
        Ok(self
            .data
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone()))
    }

    fn reorganize(&mut self) -> Result<()> {
        self.check_open()
    }

    fn sync(&mut self) -> Result<()> {
        self.check_open()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.data.clear();
        Ok(())
    }

    fn engine_name(&self) -> &'static str {
        Self::ENGINE_NAME
    }
}
