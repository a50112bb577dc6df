//! Sharing one worker thread between several users.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::runner::ThreadRunner;

/// Lazily created, reference-counted runners keyed by name.
///
/// Everything that acquires the same key shares one worker thread, so all
/// their calls are serialized together. The registry only holds weak
/// references: once the last `Arc` returned by [`acquire`](Self::acquire)
/// is dropped, the runner stops and the next `acquire` starts a fresh one.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use kvbridge_runner::{RunnerConfig, RunnerRegistry};
///
/// let registry = RunnerRegistry::new(RunnerConfig::default());
/// let a = registry.acquire("main").unwrap();
/// let b = registry.acquire("main").unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// registry.shutdown();
/// ```
#[derive(Debug)]
pub struct RunnerRegistry {
    config: RunnerConfig,
    runners: Mutex<HashMap<String, Weak<ThreadRunner>>>,
}

impl RunnerRegistry {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Return the started runner for `key`, creating it if needed.
    pub fn acquire(&self, key: &str) -> Result<Arc<ThreadRunner>> {
        let mut runners = self.runners.lock().unwrap_or_else(PoisonError::into_inner);
        runners.retain(|_, runner| runner.strong_count() > 0);

        if let Some(runner) = runners.get(key).and_then(Weak::upgrade) {
            return Ok(runner);
        }

        let config = self
            .config
            .clone()
            .with_thread_name(format!("{}-{}", self.config.thread_name, key));
        let runner = Arc::new(ThreadRunner::with_config(config));
        runner.start()?;
        tracing::debug!(key, "registered runner");

        runners.insert(key.to_string(), Arc::downgrade(&runner));
        Ok(runner)
    }

    /// Number of runners still in use.
    pub fn len(&self) -> usize {
        self.runners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|runner| runner.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every live runner and forget all entries.
    ///
    /// Calls already queued still complete. Holders of a runner see
    /// [`RunnerError::Stopped`](crate::RunnerError::Stopped) on later
    /// submissions.
    pub fn shutdown(&self) {
        let mut runners = self.runners.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, runner) in runners.drain() {
            if let Some(runner) = runner.upgrade() {
                tracing::debug!(key = %key, "stopping registered runner");
                runner.stop();
            }
        }
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}
