//! kvbridge-store: blocking key-value engines
//!
//! This crate defines [`KeyValueStore`], the synchronous single-connection
//! contract every engine implements, plus two engines:
//!
//! - [`LogStore`]: one append-only file with an in-memory ordered index
//! - [`MemoryStore`]: a `BTreeMap`, for tests and baselines
//!
//! Nothing here is async or thread-aware. Engines are meant to be owned by a
//! single worker thread and driven from there.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use kvbridge_store::{whichdb, KeyValueStore, LogStore, OpenFlags};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("colors.kvb");
//!
//! let mut store = LogStore::open(&path, "c".parse::<OpenFlags>().unwrap()).unwrap();
//! store.set(Bytes::from("alpha"), Bytes::from("green")).unwrap();
//! store.close().unwrap();
//!
//! assert_eq!(whichdb(&path).as_deref(), Some("kvbridge.log"));
//! ```

mod detect;
mod error;
mod flags;
mod log_store;
mod memory;
mod traits;

pub use detect::whichdb;
pub use error::{Result, StoreError};
pub use flags::{OpenFlags, OpenMode};
pub use log_store::LogStore;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;
