//! Opening file-backed databases.

use std::path::Path;

use kvbridge_runner::RunnerRegistry;
use kvbridge_store::{LogStore, OpenFlags};

use crate::database::Database;
use crate::error::Result;

/// Prepare a [`LogStore`] at `path` with its own worker thread.
///
/// Nothing touches the file until [`Database::connect`].
///
/// ```rust,no_run
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> kvbridge::Result<()> {
/// let db = kvbridge::open("colors.kvb", "c".parse()?);
/// db.connect().await?;
/// db.set("alpha", "green").await?;
/// db.close().await
/// # }
/// ```
pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Database<LogStore> {
    let path = path.as_ref().to_path_buf();
    Database::new(move || LogStore::open(path, flags))
}

/// Like [`open`], but run on the registry's runner for the calling thread.
///
/// Every database opened this way from the same scheduler thread shares one
/// worker, and closing them leaves it to the registry.
pub fn open_with(
    path: impl AsRef<Path>,
    flags: OpenFlags,
    registry: &RunnerRegistry,
) -> Result<Database<LogStore>> {
    let key = format!("{:?}", std::thread::current().id());
    let runner = registry.acquire(&key)?;
    let path = path.as_ref().to_path_buf();
    Ok(Database::with_shared_runner(
        move || LogStore::open(path, flags),
        runner,
    ))
}

/// Guess the engine of the file at `path` without blocking the caller.
///
/// See [`kvbridge_store::whichdb`] for the meaning of the result.
pub async fn whichdb(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref().to_path_buf();
    match tokio::task::spawn_blocking(move || kvbridge_store::whichdb(path)).await {
        Ok(kind) => kind,
        Err(e) => {
            tracing::warn!(error = %e, "whichdb task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.kvb");
        let db = open(&path, OpenFlags::create());
        assert!(!path.exists());

        db.connect().await.unwrap();
        assert!(path.exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_with_shares_a_runner() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RunnerRegistry::default();

        let a = open_with(dir.path().join("a.kvb"), OpenFlags::create(), &registry).unwrap();
        let b = open_with(dir.path().join("b.kvb"), OpenFlags::create(), &registry).unwrap();
        assert_eq!(registry.len(), 1);

        a.connect().await.unwrap();
        b.connect().await.unwrap();
        a.close().await.unwrap();

        b.set("alpha", "green").await.unwrap();
        b.close().await.unwrap();
        registry.shutdown();
    }

    #[tokio::test]
    async fn whichdb_runs_off_the_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(whichdb(dir.path().join("missing")).await, None);
    }
}
