//! Key-by-key traversal.

use bytes::Bytes;
use kvbridge_store::KeyValueStore;

use crate::database::Database;
use crate::error::Result;

enum Position {
    Start,
    At(Bytes),
    Done,
}

/// Async cursor over the keys of a [`Database`].
///
/// Each step is one `first_key` or `next_key` call on the worker, so a large
/// store is never copied out in one piece. Keys written during the walk may
/// or may not be visited, depending on the engine's order.
///
/// ```rust
/// use kvbridge::{Database, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> kvbridge::Result<()> {
/// let db = Database::new(|| Ok(MemoryStore::new()));
/// db.connect().await?;
/// db.set("a", "1").await?;
/// db.set("b", "2").await?;
///
/// let mut cursor = db.key_cursor();
/// while let Some(key) = cursor.next().await? {
///     println!("{:?}", key);
/// }
/// # db.close().await
/// # }
/// ```
pub struct KeyCursor<'a, S: KeyValueStore> {
    db: &'a Database<S>,
    position: Position,
}

impl<'a, S: KeyValueStore> KeyCursor<'a, S> {
    pub(crate) fn new(db: &'a Database<S>) -> Self {
        Self {
            db,
            position: Position::Start,
        }
    }

    /// Next key, or `None` once the traversal is finished.
    pub async fn next(&mut self) -> Result<Option<Bytes>> {
        let key = match &self.position {
            Position::Start => self.db.first_key().await?,
            Position::At(previous) => self.db.next_key(previous).await?,
            Position::Done => return Ok(None),
        };
        self.position = match &key {
            Some(key) => Position::At(key.clone()),
            None => Position::Done,
        };
        Ok(key)
    }

    /// Drain the remaining keys.
    pub async fn collect(mut self) -> Result<Vec<Bytes>> {
        let mut keys = Vec::new();
        while let Some(key) = self.next().await? {
            keys.push(key);
        }
        Ok(keys)
    }
}
