/// Configuration for a [`ThreadRunner`](crate::ThreadRunner).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Name given to the worker OS thread.
    pub thread_name: String,

    /// Stack size for the worker thread. `None` keeps the platform default.
    pub stack_size: Option<usize>,
}

impl RunnerConfig {
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            thread_name: "kvbridge-worker".to_string(),
            stack_size: None,
        }
    }
}
