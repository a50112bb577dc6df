//! Units of work crossing from async callers to the worker thread.

use std::fmt;

use tokio::sync::oneshot;

use crate::outcome::Outcome;

type Payload = Box<dyn FnOnce() + Send + 'static>;

/// A submitted call together with the sink for its outcome.
///
/// The payload closure owns the sending half of a oneshot channel. Running
/// it delivers exactly one [`Outcome`]; dropping it unrun drops the sender,
/// which the waiting submitter observes as a closed channel.
pub(crate) struct Call {
    id: u64,
    label: &'static str,
    payload: Payload,
}

impl Call {
    pub(crate) fn new<F, T>(id: u64, f: F, sink: oneshot::Sender<Outcome<T>>) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let payload = Box::new(move || {
            let outcome = Outcome::capture(f);
            if sink.send(outcome).is_err() {
                // The submitting future was dropped while the call ran.
                tracing::debug!(call = id, "submitter went away before delivery");
            }
        });

        Self {
            id,
            label: std::any::type_name::<F>(),
            payload,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Execute the payload and deliver its outcome.
    pub(crate) fn run(self) {
        (self.payload)()
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// What travels through the runner queue.
#[derive(Debug)]
pub(crate) enum Message {
    Call(Call),
    /// Terminates the worker loop once dequeued.
    Stop,
}

impl Message {
    pub(crate) fn is_stop_signal(&self) -> bool {
        matches!(self, Message::Stop)
    }

    /// Take the call out of this message.
    ///
    /// # Panics
    ///
    /// Panics on a stop signal. A stop signal has no payload or sink, and
    /// asking for one is a bug in the caller.
    pub(crate) fn into_call(self) -> Call {
        match self {
            Message::Call(call) => call,
            Message::Stop => panic!("stop signal carries no call"),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Call(call) => write!(f, "call #{} ({})", call.id, call.label),
            Message::Stop => write!(f, "stop"),
        }
    }
}
