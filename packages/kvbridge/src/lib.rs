//! kvbridge: async access to blocking key-value stores
//!
//! Embedded key-value engines are synchronous and usually not safe to use
//! from more than one thread. This crate puts such an engine behind a
//! single worker thread and exposes it as an async [`Database`] handle:
//!
//! ```text
//! task ──submit──▶ queue ──▶ worker thread ──▶ store
//!   ▲                              │
//!   └──────── oneshot outcome ◀────┘
//! ```
//!
//! The worker comes from [`kvbridge_runner`]; the engines and their
//! contract from [`kvbridge_store`]. The commonly used items of both are
//! re-exported here.
//!
//! # Example
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> kvbridge::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let db = kvbridge::open(dir.path().join("colors.kvb"), "c".parse()?);
//!
//! db.connect().await?;
//! db.set("alpha", "green").await?;
//! assert!(db.exists("alpha").await?);
//!
//! db.delete("alpha").await?;
//! let err = db.delete("alpha").await.unwrap_err();
//! assert!(err.is_not_found());
//!
//! db.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! Calls cannot be cancelled or timed out. Dropping an operation's future
//! does not stop the call on the worker.

mod cursor;
mod database;
mod error;
mod open;

pub use cursor::KeyCursor;
pub use database::{with_database, Database};
pub use error::{Error, Result};
pub use open::{open, open_with, whichdb};

pub use kvbridge_runner::{RunnerConfig, RunnerError, RunnerRegistry, ThreadRunner};
pub use kvbridge_store::{KeyValueStore, LogStore, MemoryStore, OpenFlags, OpenMode, StoreError};
