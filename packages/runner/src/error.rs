//! Error types for the runner.

use thiserror::Error;

/// Errors raised by [`ThreadRunner`](crate::ThreadRunner) itself.
///
/// These never describe what a submitted call did wrong, only how it was
/// scheduled. A call returning `Err(..)` hands that value back untouched as
/// part of its result.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// `submit` was called before `start`.
    #[error("runner is not started")]
    NotStarted,

    /// `start` was called a second time.
    #[error("runner was already started")]
    AlreadyStarted,

    /// The runner has been asked to stop, or its thread already exited.
    #[error("runner is stopped")]
    Stopped,

    /// The submitted call panicked on the worker thread.
    #[error("call panicked on worker thread: {message}")]
    Panicked { message: String },

    /// The operating system refused to spawn the worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type alias for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
