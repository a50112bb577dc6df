//! Error type for database handles.

use kvbridge_runner::RunnerError;
use kvbridge_store::StoreError;
use thiserror::Error;

/// Errors returned by [`Database`](crate::Database).
///
/// The first three variants are misuse of the handle and never reach the
/// worker thread. `Runner` and `Store` come from executing a call.
#[derive(Debug, Error)]
pub enum Error {
    #[error("database is already connected")]
    AlreadyConnected,

    #[error("database is not connected")]
    NotConnected,

    /// `connect` on a handle that was closed, or whose connect failed.
    #[error("database is closed and cannot be reconnected")]
    Closed,

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// True for errors caused by using the handle in the wrong state, as
    /// opposed to failures of the store itself.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Error::AlreadyConnected | Error::NotConnected | Error::Closed
        )
    }

    /// True if the store reported a missing key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_key_not_found())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
