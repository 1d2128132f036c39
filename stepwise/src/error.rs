//! Error types shared by every layer of the event loop.

use std::any::Any;
use std::sync::Arc;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while driving deferred results and tasks.
///
/// `Error` is `Clone` because a completed [`Deferred`](crate::Deferred) keeps its
/// outcome and hands a copy to every reader.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An operation was attempted on a deferred result, task, or loop that is not in a
    /// state allowing it (resolving twice, reading a pending result, re-entering the loop).
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The computation or deferred result was cancelled.
    #[error("operation was cancelled")]
    Cancelled,

    /// Produced by [`Handle::with_timeout`](crate::Handle::with_timeout) and
    /// [`time::timeout`](crate::time::timeout) when the deadline elapsed first.
    #[error("operation timed out")]
    Timeout,

    /// The loop has nothing left that could ever complete the root unit.
    #[error("event loop stalled: nothing can complete the root unit")]
    Stalled,

    /// A hosted computation panicked while being stepped.
    #[error("computation panicked: {0}")]
    Panicked(String),

    /// An arbitrary failure raised by a hosted computation.
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any error (or message) as a computation failure.
    ///
    /// ```rust
    /// use stepwise::Error;
    ///
    /// let err = Error::new("disk full");
    /// assert_eq!(err.to_string(), "disk full");
    /// ```
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Failed(Arc::from(error.into()))
    }

    /// Returns `true` for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns `true` for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        Error::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_messages_and_errors() {
        let err = Error::new("boom");
        assert_eq!(err.to_string(), "boom");

        let io = std::io::Error::other("socket closed");
        let err = Error::new(io);
        assert!(matches!(err, Error::Failed(_)));
        assert_eq!(err.to_string(), "socket closed");
    }

    #[test]
    fn classifies_control_flow_variants() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Cancelled.is_timeout());
        assert!(Error::Timeout.is_timeout());
        assert!(!Error::new("x").is_cancelled());
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = Error::from_panic(Box::new("static message"));
        assert_eq!(err.to_string(), "computation panicked: static message");

        let err = Error::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "computation panicked: owned");

        let err = Error::from_panic(Box::new(7_u32));
        assert_eq!(err.to_string(), "computation panicked: non-string panic payload");
    }
}
