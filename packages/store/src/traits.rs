//! The blocking store contract.

use bytes::Bytes;

use crate::error::{Result, StoreError};

/// A blocking, single-connection key-value store.
///
/// Every method may block on disk I/O. Implementations are not expected to
/// be shareable between threads; callers serialize access themselves, for
/// example by owning the store on one worker thread.
///
/// Key traversal and maintenance are optional. Their default
/// implementations fail with [`StoreError::NotSupported`].
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Box<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + 'static {
    /// Value stored under `key`, or `None`.
    fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&mut self, key: Bytes, value: Bytes) -> Result<()>;

    /// Remove `key`.
    ///
    /// Fails with [`StoreError::KeyNotFound`] if the key is absent.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    fn exists(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All keys currently stored. Order is engine specific.
    fn keys(&mut self) -> Result<Vec<Bytes>>;

    /// Return the value under `key`, first storing `default` there if the
    /// key is absent.
    fn setdefault(&mut self, key: Bytes, default: Bytes) -> Result<Bytes> {
        if let Some(existing) = self.get(&key)? {
            return Ok(existing);
        }
        self.set(key, default.clone())?;
        Ok(default)
    }

    /// First key of a traversal, or `None` for an empty store.
    fn first_key(&mut self) -> Result<Option<Bytes>> {
        Err(StoreError::NotSupported {
            operation: "first_key",
        })
    }

    /// Key following `key` in a traversal, or `None` at the end.
    fn next_key(&mut self, _key: &[u8]) -> Result<Option<Bytes>> {
        Err(StoreError::NotSupported {
            operation: "next_key",
        })
    }

    /// Reclaim space left behind by overwrites and deletes.
    fn reorganize(&mut self) -> Result<()> {
        Err(StoreError::NotSupported {
            operation: "reorganize",
        })
    }

    /// Force buffered writes to disk.
    fn sync(&mut self) -> Result<()> {
        Err(StoreError::NotSupported { operation: "sync" })
    }

    /// Flush and release the store. Later calls fail with
    /// [`StoreError::Closed`].
    fn close(&mut self) -> Result<()>;

    /// Short identifier of the engine, e.g. `"kvbridge.log"`.
    fn engine_name(&self) -> &'static str;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        self.as_mut().get(key)
    }

    fn set(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        self.as_mut().set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.as_mut().delete(key)
    }

    fn exists(&mut self, key: &[u8]) -> Result<bool> {
        self.as_mut().exists(key)
    }

    fn keys(&mut self) -> Result<Vec<Bytes>> {
        self.as_mut().keys()
    }

    fn setdefault(&mut self, key: Bytes, default: Bytes) -> Result<Bytes> {
        self.as_mut().setdefault(key, default)
    }

    fn first_key(&mut self) -> Result<Option<Bytes>> {
        self.as_mut().first_key()
    }

    fn next_key(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        self.as_mut().next_key(key)
    }

    fn reorganize(&mut self) -> Result<()> {
        self.as_mut().reorganize()
    }

    fn sync(&mut self) -> Result<()> {
        self.as_mut().sync()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }

    fn engine_name(&self) -> &'static str {
        self.as_ref().engine_name()
    }
}
