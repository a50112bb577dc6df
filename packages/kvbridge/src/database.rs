//! The async database handle.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use kvbridge_runner::{RunnerConfig, ThreadRunner};
use kvbridge_store::{KeyValueStore, Result as StoreResult};

use crate::cursor::KeyCursor;
use crate::error::{Error, Result};

type Connector<S> = Box<dyn FnOnce() -> StoreResult<S> + Send>;

/// Shared between the handle and calls in flight; only ever locked on the
/// worker thread.
type Handle<S> = Arc<Mutex<S>>;

enum State<S> {
    Idle(Connector<S>),
    Connecting,
    Live(Handle<S>),
    Closed,
}

impl<S> State<S> {
    fn name(&self) -> &'static str {
        match self {
            State::Idle(_) => "idle",
            State::Connecting => "connecting",
            State::Live(_) => "live",
            State::Closed => "closed",
        }
    }
}

/// The worker a database runs its calls on.
enum RunnerLease {
    /// Started by `connect`, stopped by `close`.
    Owned(ThreadRunner),
    /// Borrowed from a registry; its lifetime is not ours to manage.
    Shared(Arc<ThreadRunner>),
}

impl RunnerLease {
    fn runner(&self) -> &ThreadRunner {
        match self {
            RunnerLease::Owned(runner) => runner,
            RunnerLease::Shared(runner) => runner,
        }
    }

    fn start(&self) -> Result<()> {
        match self {
            RunnerLease::Owned(runner) => Ok(runner.start()?),
            RunnerLease::Shared(_) => Ok(()),
        }
    }

    fn release(&self) {
        if let RunnerLease::Owned(runner) = self {
            runner.stop();
        }
    }
}

/// Async handle to a blocking [`KeyValueStore`].
///
/// The store itself lives behind a worker thread: `connect` runs the
/// connector there, and every operation is shipped over as a closure and
/// awaited. The calling task never blocks and never touches the store.
///
/// A handle goes through `idle -> live -> closed` exactly once. Operations
/// outside `live` fail with [`Error::NotConnected`] without reaching the
/// worker, and a closed handle cannot be reconnected.
///
/// All methods take `&self`, so one handle can serve many concurrent
/// tasks. Their calls are executed one at a time in arrival order.
///
/// # Example
///
/// ```rust
/// use kvbridge::{Database, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> kvbridge::Result<()> {
/// let db = Database::new(|| Ok(MemoryStore::new()));
/// db.connect().await?;
///
/// db.set("alpha", "green").await?;
/// assert_eq!(db.get("alpha").await?.as_deref(), Some(&b"green"[..]));
///
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Database<S: KeyValueStore> {
    lease: RunnerLease,
    state: Mutex<State<S>>,
}

impl<S: KeyValueStore> Database<S> {
    /// Create a handle with its own worker thread. Nothing runs until
    /// [`connect`](Self::connect).
    pub fn new<C>(connector: C) -> Self
    where
        C: FnOnce() -> StoreResult<S> + Send + 'static,
    {
        Self::with_runner_config(connector, RunnerConfig::default())
    }

    pub fn with_runner_config<C>(connector: C, config: RunnerConfig) -> Self
    where
        C: FnOnce() -> StoreResult<S> + Send + 'static,
    {
        Self::from_parts(
            Box::new(connector),
            RunnerLease::Owned(ThreadRunner::with_config(config)),
        )
    }

    /// Create a handle that runs its calls on an already started runner,
    /// typically one obtained from a
    /// [`RunnerRegistry`](kvbridge_runner::RunnerRegistry).
    ///
    /// Closing the handle leaves the runner running.
    pub fn with_shared_runner<C>(connector: C, runner: Arc<ThreadRunner>) -> Self
    where
        C: FnOnce() -> StoreResult<S> + Send + 'static,
    {
        Self::from_parts(Box::new(connector), RunnerLease::Shared(runner))
    }

    fn from_parts(connector: Connector<S>, lease: RunnerLease) -> Self {
        Self {
            lease,
            state: Mutex::new(State::Idle(connector)),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.lock_state(), State::Live(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock_state(), State::Closed)
    }

    /// Open the store on the worker thread.
    ///
    /// If the connector fails, the owned runner is stopped, the handle
    /// becomes closed, and the connector's error is returned. The same
    /// happens if the returned future is dropped before the connector
    /// finishes; a store it opened anyway is dropped on the worker.
    pub async fn connect(&self) -> Result<()> {
        let connector = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, State::Connecting) {
                State::Idle(connector) => connector,
                other => {
                    let err = match other {
                        State::Closed => Error::Closed,
                        _ => Error::AlreadyConnected,
                    };
                    *state = other;
                    return Err(err);
                }
            }
        };

        if let Err(e) = self.lease.start() {
            *self.lock_state() = State::Closed;
            return Err(e);
        }

        let guard = ReleaseOnDrop::new(self);
        let connected = self
            .lease
            .runner()
            .submit(move || connector().map(|store| Arc::new(Mutex::new(store))))
            .await;
        guard.disarm();

        match connected {
            Ok(Ok(handle)) => {
                *self.lock_state() = State::Live(handle);
                tracing::debug!("database connected");
                Ok(())
            }
            Ok(Err(e)) => {
                self.abandon_connect();
                Err(e.into())
            }
            Err(e) => {
                self.abandon_connect();
                Err(e.into())
            }
        }
    }

    fn abandon_connect(&self) {
        *self.lock_state() = State::Closed;
        self.lease.release();
        tracing::debug!("connect failed, runner released");
    }

    /// Close the store and release the worker.
    ///
    /// Does nothing unless the handle is live. Otherwise the handle is
    /// closed and an owned runner is stopped even if the store's own close
    /// fails; that failure is still returned. Calls queued before `close`
    /// complete first.
    ///
    /// Dropping the returned future part way still leaves the handle closed
    /// and the owned runner stopped; the store's close runs on the worker
    /// regardless.
    pub async fn close(&self) -> Result<()> {
        let handle = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, State::Closed) {
                State::Live(handle) => handle,
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };

        let release = ReleaseOnDrop::new(self);
        let closed = self
            .lease
            .runner()
            .submit(move || lock(&handle).close())
            .await;
        drop(release);

        match closed {
            Ok(Ok(())) => {
                tracing::debug!("database closed");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "store close failed");
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(error = %e, "store close did not run");
                Err(e.into())
            }
        }
    }

    /// Run `f` against the store on the worker thread.
    ///
    /// This is the escape hatch for engine-specific calls; every other
    /// operation is built on it.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut S) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.live_handle()?;
        let result = self
            .lease
            .runner()
            .submit(move || {
                let mut store = lock(&handle);
                f(&mut store)
            })
            .await?;
        Ok(result?)
    }

    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let key = owned(key);
        self.call(move |store| store.get(&key)).await
    }

    /// Value under `key`, or `default` if it is absent.
    pub async fn get_or(
        &self,
        key: impl AsRef<[u8]>,
        default: impl Into<Bytes>,
    ) -> Result<Bytes> {
        let default = default.into();
        Ok(self.get(key).await?.unwrap_or(default))
    }

    pub async fn set(&self, key: impl AsRef<[u8]>, value: impl Into<Bytes>) -> Result<()> {
        let key = owned(key);
        let value = value.into();
        self.call(move |store| store.set(key, value)).await
    }

    /// Remove `key`. A missing key is an error; check it with
    /// [`Error::is_not_found`].
    pub async fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let key = owned(key);
        self.call(move |store| store.delete(&key)).await
    }

    pub async fn exists(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let key = owned(key);
        self.call(move |store| store.exists(&key)).await
    }

    pub async fn keys(&self) -> Result<Vec<Bytes>> {
        self.call(|store| store.keys()).await
    }

    pub async fn setdefault(
        &self,
        key: impl AsRef<[u8]>,
        default: impl Into<Bytes>,
    ) -> Result<Bytes> {
        let key = owned(key);
        let default = default.into();
        self.call(move |store| store.setdefault(key, default)).await
    }

    pub async fn first_key(&self) -> Result<Option<Bytes>> {
        self.call(|store| store.first_key()).await
    }

    pub async fn next_key(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let key = owned(key);
        self.call(move |store| store.next_key(&key)).await
    }

    pub async fn reorganize(&self) -> Result<()> {
        self.call(|store| store.reorganize()).await
    }

    pub async fn sync(&self) -> Result<()> {
        self.call(|store| store.sync()).await
    }

    pub async fn engine_name(&self) -> Result<&'static str> {
        self.call(|store| Ok(store.engine_name())).await
    }

    /// Walk the keys with one `first_key`/`next_key` round trip per key.
    pub fn key_cursor(&self) -> KeyCursor<'_, S> {
        KeyCursor::new(self)
    }

    fn live_handle(&self) -> Result<Handle<S>> {
        match &*self.lock_state() {
            State::Live(handle) => Ok(Arc::clone(handle)),
            _ => Err(Error::NotConnected),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State<S>> {
        lock(&self.state)
    }
}

/// Closes the handle and releases its runner when dropped, unless disarmed.
///
/// Held across the awaits in `connect` and `close` so a cancelled future
/// cannot leave the handle half-open or an owned worker running.
struct ReleaseOnDrop<'a, S: KeyValueStore> {
    db: &'a Database<S>,
    armed: bool,
}

impl<'a, S: KeyValueStore> ReleaseOnDrop<'a, S> {
    fn new(db: &'a Database<S>) -> Self {
        Self { db, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S: KeyValueStore> Drop for ReleaseOnDrop<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            *self.db.lock_state() = State::Closed;
            self.db.lease.release();
        }
    }
}

impl<S: KeyValueStore> Drop for Database<S> {
    fn drop(&mut self) {
        let state = std::mem::replace(
            self.state.get_mut().unwrap_or_else(PoisonError::into_inner),
            State::Closed,
        );
        if let State::Live(handle) = state {
            tracing::warn!("database dropped while connected, closing on worker");
            let queued = self.lease.runner().detach(move || {
                if let Err(e) = lock(&handle).close() {
                    tracing::warn!(error = %e, "store close failed");
                }
            });
            if let Err(e) = queued {
                tracing::debug!(error = %e, "could not queue close for dropped database");
            }
        }
        self.lease.release();
    }
}

impl<S: KeyValueStore> fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lease = match &self.lease {
            RunnerLease::Owned(_) => "owned",
            RunnerLease::Shared(_) => "shared",
        };
        f.debug_struct("Database")
            .field("state", &self.lock_state().name())
            .field("runner", &lease)
            .finish()
    }
}

/// Connect `db`, run `body`, and close `db` on every exit path.
///
/// An error from `body` takes precedence over an error from closing.
///
/// ```rust
/// use kvbridge::{with_database, Database, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> kvbridge::Result<()> {
/// let db = Database::new(|| Ok(MemoryStore::new()));
/// let value = with_database(&db, |db| async move {
///     db.set("alpha", "green").await?;
///     db.get_or("alpha", "none").await
/// })
/// .await?;
///
/// assert_eq!(value, "green");
/// assert!(db.is_closed());
/// # Ok(())
/// # }
/// ```
pub async fn with_database<'a, S, F, Fut, T, E>(
    db: &'a Database<S>,
    body: F,
) -> std::result::Result<T, E>
where
    S: KeyValueStore,
    F: FnOnce(&'a Database<S>) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>> + 'a,
    E: From<Error>,
{
    db.connect().await?;
    let result = body(db).await;
    let closed = db.close().await;
    let value = result?;
    closed?;
    Ok(value)
}

fn owned(key: impl AsRef<[u8]>) -> Bytes {
    Bytes::copy_from_slice(key.as_ref())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
