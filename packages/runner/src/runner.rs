//! The worker thread and its queue.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use crate::config::RunnerConfig;
use crate::error::{Result, RunnerError};
use crate::message::{Call, Message};
use crate::outcome::Outcome;

/// Lifecycle of a [`ThreadRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Created, `start` not yet called.
    NotStarted,
    /// Worker thread is executing calls.
    Running,
    /// Stop was requested; calls queued before the stop signal still run.
    Draining,
    /// Worker thread has exited.
    Stopped,
}

impl RunnerState {
    fn as_u8(self) -> u8 {
        match self {
            RunnerState::NotStarted => 0,
            RunnerState::Running => 1,
            RunnerState::Draining => 2,
            RunnerState::Stopped => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RunnerState::NotStarted,
            1 => RunnerState::Running,
            2 => RunnerState::Draining,
            _ => RunnerState::Stopped,
        }
    }
}

/// Runs blocking calls, one at a time and in submission order, on a
/// dedicated OS thread.
///
/// Async code hands a closure to [`submit`](Self::submit) and awaits its
/// result without blocking the scheduler thread. The worker delivers each
/// result through a oneshot channel, so the awaiting task is woken on its
/// own scheduler and no async code ever runs on the worker.
///
/// Calls cannot be cancelled once submitted. Dropping the future returned by
/// `submit` only discards the result; the call itself still runs.
///
/// # Example
///
/// ```rust
/// use kvbridge_runner::ThreadRunner;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), kvbridge_runner::RunnerError> {
/// let runner = ThreadRunner::new();
/// runner.start()?;
///
/// let answer = runner.submit(|| 6 * 7).await?;
/// assert_eq!(answer, 42);
///
/// runner.stop();
/// # Ok(())
/// # }
/// ```
pub struct ThreadRunner {
    config: RunnerConfig,
    tx: mpsc::UnboundedSender<Message>,
    /// Moved into the worker thread by `start`.
    rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    state: Arc<AtomicU8>,
    next_id: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadRunner {
    /// Create a runner with the default configuration. The thread is not
    /// spawned until [`start`](Self::start).
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            tx,
            rx: Mutex::new(Some(rx)),
            state: Arc::new(AtomicU8::new(RunnerState::NotStarted.as_u8())),
            next_id: AtomicU64::new(0),
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn state(&self) -> RunnerState {
        RunnerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Spawn the worker thread.
    ///
    /// A runner starts at most once; a second call fails with
    /// [`RunnerError::AlreadyStarted`] rather than restarting it.
    pub fn start(&self) -> Result<()> {
        let rx = lock(&self.rx)
            .take()
            .ok_or(RunnerError::AlreadyStarted)?;

        let mut builder = thread::Builder::new().name(self.config.thread_name.clone());
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        self.set_state(RunnerState::Running);
        let state = Arc::clone(&self.state);
        match builder.spawn(move || worker_loop(rx, state)) {
            Ok(handle) => {
                *lock(&self.handle) = Some(handle);
                tracing::debug!(thread = %self.config.thread_name, "runner started");
                Ok(())
            }
            Err(e) => {
                self.set_state(RunnerState::Stopped);
                Err(RunnerError::Spawn(e))
            }
        }
    }

    /// Run `f` on the worker thread and wait for its result.
    ///
    /// The calling task is suspended, not blocked. A panic inside `f` is
    /// returned as [`RunnerError::Panicked`] and does not disturb later
    /// calls. Errors that `f` returns as values come back unchanged inside
    /// `T`.
    ///
    /// Fails with [`RunnerError::NotStarted`] before `start` and with
    /// [`RunnerError::Stopped`] once `stop` has been called. A call that
    /// slips into the queue behind the stop signal is discarded and also
    /// resolves to `Stopped`.
    pub async fn submit<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let outcome = self.enqueue(f)?;
        match outcome.await {
            Ok(outcome) => outcome.into_result(),
            // Sink dropped unrun: the worker exited before reaching this call.
            Err(_) => Err(RunnerError::Stopped),
        }
    }

    /// Queue `f` without waiting for it.
    ///
    /// The result is discarded. Ordering is the same as for
    /// [`submit`](Self::submit), so a detached call still runs before
    /// anything queued after it, including the stop signal.
    pub fn detach<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(f).map(drop)
    }

    fn enqueue<F, T>(&self, f: F) -> Result<oneshot::Receiver<Outcome<T>>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        match self.state() {
            RunnerState::Running => {}
            RunnerState::NotStarted => return Err(RunnerError::NotStarted),
            RunnerState::Draining | RunnerState::Stopped => return Err(RunnerError::Stopped),
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sink, outcome) = oneshot::channel();
        let message = Message::Call(Call::new(id, f, sink));
        tracing::trace!(%message, "enqueue");

        self.tx.send(message).map_err(|_| RunnerError::Stopped)?;
        Ok(outcome)
    }

    /// Ask the worker to exit after everything already queued.
    ///
    /// Does not wait for the thread. Calling it again, or on a runner that
    /// was never started, does nothing.
    pub fn stop(&self) {
        let running = RunnerState::Running.as_u8();
        let draining = RunnerState::Draining.as_u8();
        if self
            .state
            .compare_exchange(running, draining, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(thread = %self.config.thread_name, "stop requested");
            // Only fails if the worker already dropped its receiver.
            let _ = self.tx.send(Message::Stop);
        }
    }

    /// True while the worker thread has not exited.
    pub fn is_alive(&self) -> bool {
        lock(&self.handle)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Block the current thread until the worker exits.
    ///
    /// Returns immediately if the runner was never started. Blocks forever
    /// if called before [`stop`](Self::stop); use it from synchronous code
    /// only, never from inside an async task.
    pub fn join(&self) {
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!(thread = %self.config.thread_name, "worker thread panicked");
            }
        }
    }

    fn set_state(&self, state: RunnerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

impl Default for ThreadRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ThreadRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRunner")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn worker_loop(mut rx: mpsc::UnboundedReceiver<Message>, state: Arc<AtomicU8>) {
    tracing::debug!("worker loop started");

    while let Some(message) = rx.blocking_recv() {
        if message.is_stop_signal() {
            break;
        }
        let call = message.into_call();
        let id = call.id();
        tracing::trace!(call = id, "executing");
        call.run();
        tracing::trace!(call = id, "delivered");
    }

    // Anything that raced in behind the stop signal is dropped here, which
    // closes its sink and fails the waiting submitter with `Stopped`.
    rx.close();
    while let Ok(message) = rx.try_recv() {
        if !message.is_stop_signal() {
            tracing::debug!(%message, "discarding call queued after stop");
        }
    }

    state.store(RunnerState::Stopped.as_u8(), Ordering::Release);
    tracing::debug!("worker loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    async fn wait_until_dead(runner: &ThreadRunner) {
        for _ in 0..200 {
            if !runner.is_alive() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("worker thread did not exit");
    }

    #[test]
    fn new_runner_is_not_started() {
        let runner = ThreadRunner::new();
        assert_eq!(runner.state(), RunnerState::NotStarted);
        assert!(!runner.is_alive());
    }

    #[test]
    fn start_and_stop() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();
        assert!(runner.is_alive());
        assert_eq!(runner.state(), RunnerState::Running);

        runner.stop();
        runner.join();
        assert!(!runner.is_alive());
        assert_eq!(runner.state(), RunnerState::Stopped);
    }

    #[test]
    fn second_start_fails() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();
        assert!(matches!(runner.start(), Err(RunnerError::AlreadyStarted)));
        runner.stop();
        runner.join();
    }

    #[test]
    fn stop_is_idempotent() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();
        runner.stop();
        runner.stop();
        runner.join();
        runner.stop();
        assert_eq!(runner.state(), RunnerState::Stopped);
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let runner = ThreadRunner::new();
        runner.stop();
        runner.join();
        assert_eq!(runner.state(), RunnerState::NotStarted);
    }

    #[test]
    fn worker_thread_uses_configured_name() {
        let runner =
            ThreadRunner::with_config(RunnerConfig::default().with_thread_name("named-worker"));
        runner.start().unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let name = rt
            .block_on(runner.submit(|| thread::current().name().map(str::to_owned)))
            .unwrap();
        assert_eq!(name.as_deref(), Some("named-worker"));
        runner.stop();
        runner.join();
    }

    #[tokio::test]
    async fn submit_before_start_fails() {
        let runner = ThreadRunner::new();
        let result = runner.submit(|| 1).await;
        assert!(matches!(result, Err(RunnerError::NotStarted)));
    }

    #[tokio::test]
    async fn submit_after_stop_fails() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();
        runner.stop();
        let result = runner.submit(|| 1).await;
        assert!(matches!(result, Err(RunnerError::Stopped)));
        wait_until_dead(&runner).await;
    }

    #[tokio::test]
    async fn runs_call_on_worker_thread() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();

        let caller = thread::current().id();
        let worker = runner.submit(|| thread::current().id()).await.unwrap();
        assert_ne!(caller, worker);

        runner.stop();
        wait_until_dead(&runner).await;
    }

    #[tokio::test]
    async fn panic_is_reported_and_worker_keeps_going() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();

        let err = runner
            .submit(|| -> u32 { panic!("Test exception") })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Panicked { ref message } if message == "Test exception"
        ));

        assert_eq!(runner.submit(|| 42).await.unwrap(), 42);

        runner.stop();
        wait_until_dead(&runner).await;
    }

    #[tokio::test]
    async fn returned_errors_pass_through_untouched() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();

        let result = runner
            .submit(|| "x".parse::<u32>())
            .await
            .unwrap();
        assert!(result.is_err());

        runner.stop();
        wait_until_dead(&runner).await;
    }

    #[tokio::test]
    async fn calls_execute_in_submission_order() {
        let runner = Arc::new(ThreadRunner::new());
        runner.start().unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for i in 0..100 {
            let runner = Arc::clone(&runner);
            let log = Arc::clone(&log);
            // Each submit enqueues before its first await point returns
            // control, so spawning in order enqueues in order.
            tasks.push(tokio::spawn(async move {
                runner
                    .submit(move || {
                        log.lock().unwrap().push(i);
                        i
                    })
                    .await
            }));
        }

        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap().unwrap(), i);
        }
        assert_eq!(*log.lock().unwrap(), (0..100).collect::<Vec<_>>());

        runner.stop();
        wait_until_dead(&runner).await;
    }

    #[tokio::test]
    async fn calls_never_overlap() {
        let runner = Arc::new(ThreadRunner::new());
        runner.start().unwrap();

        let active = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let runner = Arc::clone(&runner);
            let active = Arc::clone(&active);
            tasks.push(tokio::spawn(async move {
                runner
                    .submit(move || {
                        let before = active.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(200));
                        active.fetch_sub(1, Ordering::SeqCst);
                        before
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 0);
        }

        runner.stop();
        wait_until_dead(&runner).await;
    }

    #[tokio::test]
    async fn queued_calls_drain_before_exit() {
        let runner = Arc::new(ThreadRunner::new());
        runner.start().unwrap();

        let slow = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move {
                runner
                    .submit(|| {
                        thread::sleep(Duration::from_millis(50));
                        "slow"
                    })
                    .await
            })
        };
        let queued = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.submit(|| "queued").await })
        };
        // Let both tasks enqueue before stopping.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        runner.stop();
        assert_eq!(runner.state(), RunnerState::Draining);

        assert_eq!(slow.await.unwrap().unwrap(), "slow");
        assert_eq!(queued.await.unwrap().unwrap(), "queued");
        wait_until_dead(&runner).await;
        assert_eq!(runner.state(), RunnerState::Stopped);
    }

    #[tokio::test]
    async fn detached_call_runs_before_later_calls() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        runner
            .detach(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let seen = {
            let hits = Arc::clone(&hits);
            runner.submit(move || hits.load(Ordering::SeqCst)).await.unwrap()
        };
        assert_eq!(seen, 1);

        runner.stop();
        assert!(matches!(runner.detach(|| {}), Err(RunnerError::Stopped)));
    }

    #[tokio::test]
    async fn call_behind_stop_signal_resolves_closed() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();
        // Keep the worker busy so its receiver is still open below.
        runner
            .detach(|| thread::sleep(Duration::from_millis(50)))
            .unwrap();
        runner.stop();

        // Skips the state check in `submit`, as a racing submitter would.
        let (sink, outcome) = oneshot::channel::<Outcome<u32>>();
        let sent = runner.tx.send(Message::Call(Call::new(99, || 7, sink)));
        assert!(sent.is_ok());

        let resolved = tokio::time::timeout(Duration::from_secs(2), outcome)
            .await
            .expect("late call left its submitter hanging");
        assert!(resolved.is_err());

        wait_until_dead(&runner).await;
        assert_eq!(runner.state(), RunnerState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_submitter_gets_its_own_result() {
        use rand::Rng;

        let runner = Arc::new(ThreadRunner::new());
        runner.start().unwrap();

        let mut tasks = Vec::new();
        for i in 0..100_u64 {
            let runner = Arc::clone(&runner);
            tasks.push(tokio::spawn(async move {
                let jitter = rand::thread_rng().gen_range(0..500);
                tokio::time::sleep(Duration::from_micros(jitter)).await;
                let value = runner.submit(move || i * 3).await.unwrap();
                (i, value)
            }));
        }

        for task in tasks {
            let (i, value) = task.await.unwrap();
            assert_eq!(value, i * 3);
        }

        runner.stop();
        wait_until_dead(&runner).await;
    }

    #[tokio::test]
    async fn dropping_runner_stops_thread() {
        let runner = ThreadRunner::new();
        runner.start().unwrap();
        let handle = lock(&runner.handle).take().unwrap();
        drop(runner);

        for _ in 0..200 {
            if handle.is_finished() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("worker thread outlived its runner");
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            RunnerState::NotStarted,
            RunnerState::Running,
            RunnerState::Draining,
            RunnerState::Stopped,
        ] {
            assert_eq!(RunnerState::from_u8(state.as_u8()), state);
        }
    }
}
