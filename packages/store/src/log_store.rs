//! Append-only single-file store.
//!
//! ## File format
//!
//! ```text
//! header:  b"KVBLOG01"
//! record:  op:u8  key_len:u32le  value_len:u32le  key  value
//! ```
//!
//! `op` is 1 for a put and 2 for a delete (tombstone, empty value). Opening
//! a store replays every record into an ordered in-memory index, so reads
//! never touch the disk. Overwrites and deletes leave dead records behind
//! until [`LogStore::reorganize`] rewrites the file.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::flags::{OpenFlags, OpenMode};
use crate::traits::KeyValueStore;

pub(crate) const MAGIC: &[u8; 8] = b"KVBLOG01";

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;
const RECORD_HEADER_LEN: usize = 9;

/// File-backed store with an append-only log and an in-memory index.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use kvbridge_store::{KeyValueStore, LogStore, OpenFlags};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut store = LogStore::open(dir.path().join("data.kvb"), OpenFlags::create()).unwrap();
///
/// store.set(Bytes::from_static(b"alpha"), Bytes::from_static(b"green")).unwrap();
/// assert_eq!(store.get(b"alpha").unwrap(), Some(Bytes::from_static(b"green")));
/// store.close().unwrap();
/// ```
pub struct LogStore {
    path: PathBuf,
    flags: OpenFlags,
    /// `None` once closed.
    file: Option<File>,
    index: BTreeMap<Bytes, Bytes>,
    /// Encoded records not yet written (fast mode, or a failed flush).
    pending: Vec<u8>,
}

impl LogStore {
    pub const ENGINE_NAME: &'static str = "kvbridge.log";

    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true);
        match flags.mode {
            OpenMode::Read => {}
            OpenMode::Write => {
                options.write(true);
            }
            OpenMode::Create => {
                options.write(true).create(true);
            }
            OpenMode::New => {
                options.write(true).create(true).truncate(true);
            }
        }

        let mut file = options.open(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let index = if contents.is_empty() && flags.is_writable() {
            file.write_all(MAGIC)?;
            file.sync_data()?;
            BTreeMap::new()
        } else {
            let (index, valid_len) = replay(&contents)?;
            if valid_len < contents.len() as u64 {
                tracing::warn!(
                    path = %path.display(),
                    valid_len,
                    file_len = contents.len(),
                    "ignoring truncated trailing record"
                );
                if flags.is_writable() {
                    file.set_len(valid_len)?;
                }
            }
            index
        };

        tracing::debug!(path = %path.display(), %flags, keys = index.len(), "opened log store");

        Ok(Self {
            path,
            flags,
            file: Some(file),
            index,
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn check_open(&self) -> Result<()> {
        if self.file.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if !self.flags.is_writable() {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn append(&mut self, op: u8, key: &[u8], value: &[u8]) -> Result<()> {
        let rollback = self.pending.len();
        encode_record(&mut self.pending, op, key, value)?;
        if self.flags.fast {
            return Ok(());
        }
        if let Err(e) = self.flush_pending() {
            self.pending.truncate(rollback);
            return Err(e);
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let sync_writes = self.flags.sync_writes;
        let file = self.file.as_mut().ok_or(StoreError::Closed)?;
        append_all(file, &self.pending, sync_writes)?;
        self.pending.clear();
        Ok(())
    }

    fn reorganize_path(&self) -> PathBuf {
        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".reorg");
        PathBuf::from(tmp)
    }
}

impl KeyValueStore for LogStore {
    fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        self.check_open()?;
        Ok(self.index.get(key).cloned())
    }

    fn set(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        self.check_writable()?;
        self.append(OP_PUT, &key, &value)?;
        self.index.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.check_writable()?;
        if !self.index.contains_key(key) {
            return Err(StoreError::KeyNotFound {
                key: Bytes::copy_from_slice(key),
            });
        }
        self.append(OP_DELETE, key, &[])?;
        self.index.remove(key);
        Ok(())
    }

    fn exists(&mut self, key: &[u8]) -> Result<bool> {
        self.check_open()?;
        Ok(self.index.contains_key(key))
    }

    fn keys(&mut self) -> Result<Vec<Bytes>> {
        self.check_open()?;
        Ok(self.index.keys().cloned().collect())
    }

    fn first_key(&mut self) -> Result<Option<Bytes>> {
        self.check_open()?;
        Ok(self.index.keys().next().cloned())
    }

    fn next_key(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        self.check_open()?;
        Ok(self
            .index
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone()))
    }

    fn reorganize(&mut self) -> Result<()> {
        self.check_writable()?;
        self.flush_pending()?;

        let tmp = self.reorganize_path();
        let mut buf = Vec::from(&MAGIC[..]);
        for (key, value) in &self.index {
            encode_record(&mut buf, OP_PUT, key, value)?;
        }
        {
            let mut out = File::create(&tmp)?;
            out.write_all(&buf)?;
            out.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        self.file = Some(OpenOptions::new().read(true).write(true).open(&self.path)?);
        tracing::debug!(path = %self.path.display(), bytes = buf.len(), "reorganized log store");
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.check_open()?;
        if !self.flags.is_writable() {
            return Ok(());
        }
        self.flush_pending()?;
        if let Some(file) = self.file.as_mut() {
            file.sync_all()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let flushed = if self.flags.is_writable() {
            self.sync()
        } else {
            Ok(())
        };
        // Closed even if the final flush failed.
        self.file = None;
        self.pending.clear();
        tracing::debug!(path = %self.path.display(), "closed log store");
        flushed
    }

    fn engine_name(&self) -> &'static str {
        Self::ENGINE_NAME
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        if self.file.is_some() && !self.pending.is_empty() {
            if let Err(e) = self.flush_pending() {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "losing buffered writes on drop"
                );
            }
        }
    }
}

/// What [`append_all`] needs from the backing file.
trait LogFile: Write + Seek {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync_data(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }
}

/// Append `bytes` at the end of `file`.
///
/// On failure the file is cut back to its previous length, so a half-written
/// record never sits in front of later appends.
fn append_all<F: LogFile>(file: &mut F, bytes: &[u8], sync: bool) -> io::Result<()> {
    let start = file.seek(SeekFrom::End(0))?;
    let written = file
        .write_all(bytes)
        .and_then(|()| if sync { file.sync_data() } else { Ok(()) });
    if let Err(e) = written {
        if let Err(trim) = file.truncate_to(start) {
            tracing::warn!(len = start, error = %trim, "could not trim failed append");
        }
        return Err(e);
    }
    Ok(())
}

fn encode_record(buf: &mut Vec<u8>, op: u8, key: &[u8], value: &[u8]) -> Result<()> {
    let key_len = u32::try_from(key.len()).map_err(|_| StoreError::TooLarge { len: key.len() })?;
    let value_len =
        u32::try_from(value.len()).map_err(|_| StoreError::TooLarge { len: value.len() })?;

    buf.reserve(RECORD_HEADER_LEN + key.len() + value.len());
    buf.push(op);
    buf.extend_from_slice(&key_len.to_le_bytes());
    buf.extend_from_slice(&value_len.to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    Ok(())
}

fn read_u32(bytes: &[u8]) -> usize {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_le_bytes(raw) as usize
}

/// Rebuild the index from raw file contents.
///
/// Returns the index and the length of the valid prefix. A record cut off
/// by the end of the file stops the replay without error.
fn replay(contents: &[u8]) -> Result<(BTreeMap<Bytes, Bytes>, u64)> {
    if !contents.starts_with(MAGIC) {
        return Err(StoreError::Corrupt {
            offset: 0,
            message: "missing kvbridge log header".to_string(),
        });
    }

    let mut index = BTreeMap::new();
    let mut pos = MAGIC.len();
    while let Some(header) = contents.get(pos..pos + RECORD_HEADER_LEN) {
        let op = header[0];
        let key_len = read_u32(&header[1..5]);
        let value_len = read_u32(&header[5..9]);

        let key_start = pos + RECORD_HEADER_LEN;
        let value_start = key_start + key_len;
        let end = value_start + value_len;
        if end > contents.len() {
            break;
        }

        let key = Bytes::copy_from_slice(&contents[key_start..value_start]);
        match op {
            OP_PUT => {
                index.insert(key, Bytes::copy_from_slice(&contents[value_start..end]));
            }
            OP_DELETE => {
                index.remove(&key);
            }
            other => {
                return Err(StoreError::Corrupt {
                    offset: pos as u64,
                    message: format!("unknown record type {}", other),
                });
            }
        }
        pos = end;
    }

    Ok((index, pos as u64))
}
