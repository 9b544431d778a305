//! Schedulable unit of work.
//!
//! Both ordered queues carry [`Task`]s on behalf of the virtualization
//! layer: a closure performing the (slow, serial) transport write plus an
//! optional completion callback that receives the outcome, so the canvas
//! can reconcile its confirmed-on-hardware state asynchronously.

/// Failure produced by a task's work, typically a transport write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    reason: String,
}

impl TaskError {
    pub fn new(reason: impl Into<String>) -> Self {
        TaskError {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task failed: {}", self.reason)
    }
}

impl std::error::Error for TaskError {}

/// Outcome of a task's work, handed to its completion callback.
pub type TaskResult = Result<(), TaskError>;

/// One unit of deferred work with an optional completion callback.
pub struct Task {
    work: Box<dyn FnOnce() -> TaskResult + Send>,
    on_complete: Option<Box<dyn FnOnce(TaskResult) + Send>>,
}

impl Task {
    pub fn new(work: impl FnOnce() -> TaskResult + Send + 'static) -> Self {
        Task {
            work: Box::new(work),
            on_complete: None,
        }
    }

    /// Register a callback invoked with the work's result after it runs.
    pub fn on_complete(mut self, callback: impl FnOnce(TaskResult) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Run the work and deliver its result.
    ///
    /// Errors are routed to the completion callback, never thrown past the
    /// consumer thread; a failure with no callback registered is logged and
    /// absorbed.
    pub fn execute(self) {
        let result = (self.work)();
        match self.on_complete {
            Some(callback) => callback(result),
            None => {
                if let Err(err) = result {
                    log::warn!("unobserved task failure: {err}");
                }
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("has_on_complete", &self.on_complete.is_some())
            .finish()
    }
}
