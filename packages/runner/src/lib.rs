//! kvbridge-runner: blocking calls from async code on one worker thread
//!
//! A [`ThreadRunner`] owns a single OS thread and an unbounded FIFO queue.
//! Async callers submit closures; the worker executes them one at a time, in
//! submission order, and hands each result back to the task that submitted
//! it. The submitting task is suspended while it waits, never blocked.
//!
//! Use this layer for resources that must not be touched from more than one
//! thread at once, such as an embedded key-value store opened with a single
//! connection.
//!
//! # Example
//!
//! ```rust
//! use kvbridge_runner::{RunnerError, ThreadRunner};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), RunnerError> {
//! let runner = ThreadRunner::new();
//! runner.start()?;
//!
//! let len = runner.submit(|| std::fs::read_dir(".").map(|d| d.count())).await?;
//! assert!(len.is_ok());
//!
//! runner.stop();
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! There is no cancellation or timeout. Once submitted, a call runs to
//! completion on the worker even if the awaiting future is dropped.

mod config;
mod error;
mod message;
mod outcome;
mod registry;
mod runner;

pub use config::RunnerConfig;
pub use error::{Result, RunnerError};
pub use outcome::{Failure, Outcome};
pub use registry::RunnerRegistry;
pub use runner::{RunnerState, ThreadRunner};
