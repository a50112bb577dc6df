//! The tagged result of one call.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::RunnerError;

/// Description of a call that panicked instead of returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    message: String,
}

impl Failure {
    /// Extract a readable message from a panic payload.
    ///
    /// `panic!("literal")` yields a `&str`, formatted panics yield a
    /// `String`; anything else is reported generically.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Exactly one of these is produced per submitted call.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The call returned normally.
    Value(T),
    /// The call panicked.
    Failure(Failure),
}

impl<T> Outcome<T> {
    /// Run `f`, capturing a panic as [`Outcome::Failure`].
    pub fn capture<F>(f: F) -> Self
    where
        F: FnOnce() -> T,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Outcome::Value(value),
            Err(payload) => Outcome::Failure(Failure::from_panic(payload)),
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    pub fn into_result(self) -> Result<T, RunnerError> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Failure(failure) => Err(RunnerError::Panicked {
                message: failure.message,
            }),
        }
    }
}
