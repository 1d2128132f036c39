use std::fmt;

/// Lifecycle of a [`Task`](crate::Task).
///
/// ```text
/// Created ──▶ Running ──▶ Suspended ──▶ Running ──▶ … ──▶ Done
///                │            │
///                └──cancel()──┴──▶ Cancelling ──▶ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Submitted; the first step is queued but has not run yet.
    Created,

    /// The task's step is executing. At most one task per loop is in this state.
    Running,

    /// The computation yielded and waits for a dependency to complete.
    Suspended,

    /// Finished with a value or an error.
    Done,

    /// Cancellation was requested and will be raised at the next step.
    Cancelling,

    /// Finished by cancellation.
    Cancelled,
}

impl TaskState {
    /// Returns `true` for `Done` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Created => "created",
            TaskState::Running => "running",
            TaskState::Suspended => "suspended",
            TaskState::Done => "done",
            TaskState::Cancelling => "cancelling",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
