use super::Unit;
use crate::deferred::{Deferred, DeferredState};
use crate::runtime::Handle;

use std::fmt;
use std::rc::Rc;

/// When [`Handle::wait_for`] resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WaitMode {
    /// As soon as any input is done.
    FirstDone,

    /// Once every input is done.
    #[default]
    AllDone,

    /// As soon as any input fails, or once every input is done. Cancelled
    /// inputs do not count as failures.
    FirstError,
}

/// Inputs of [`Handle::wait_for`], split by completion. Both lists keep the
/// input order.
pub struct Waited<T> {
    pub done: Vec<Deferred<T>>,
    pub pending: Vec<Deferred<T>>,
}

impl<T> Clone for Waited<T> {
    fn clone(&self) -> Self {
        Self {
            done: self.done.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Waited<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waited")
            .field("done", &self.done)
            .field("pending", &self.pending)
            .finish()
    }
}

fn satisfied<T: 'static>(inputs: &[Deferred<T>], mode: WaitMode) -> bool {
    match mode {
        WaitMode::FirstDone => inputs.iter().any(Deferred::is_done),
        WaitMode::AllDone => inputs.iter().all(Deferred::is_done),
        WaitMode::FirstError => {
            inputs.iter().all(Deferred::is_done)
                || inputs
                    .iter()
                    .any(|input| input.state() == DeferredState::Rejected)
        }
    }
}

fn partition<T: 'static>(inputs: &[Deferred<T>]) -> Waited<T> {
    let (done, pending) = inputs.iter().cloned().partition(Deferred::is_done);
    Waited { done, pending }
}

impl Handle {
    /// Waits until the inputs satisfy `mode`, without cancelling anything.
    ///
    /// Resolves to the inputs split into `done` and `pending`. An empty input
    /// resolves right away with two empty lists.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stepwise::{EventLoop, Unit, WaitMode, time};
    /// use std::time::Duration;
    ///
    /// let rt = EventLoop::builder().virtual_time(true).build();
    /// let handle = rt.handle();
    ///
    /// let fast = Unit::from(async { time::sleep(Duration::from_millis(1)).await.map(|()| 1) });
    /// let slow = Unit::from(async { time::sleep(Duration::from_secs(5)).await.map(|()| 2) });
    ///
    /// let waited = rt
    ///     .run_until_complete(handle.wait_for([fast, slow], WaitMode::FirstDone))
    ///     .unwrap();
    ///
    /// assert_eq!(waited.done.len(), 1);
    /// assert_eq!(waited.done[0].result().unwrap(), 1);
    /// assert_eq!(waited.pending.len(), 1);
    /// ```
    pub fn wait_for<T, I, U>(&self, units: I, mode: WaitMode) -> Deferred<Waited<T>>
    where
        T: 'static,
        I: IntoIterator<Item = U>,
        U: Into<Unit<T>>,
    {
        let inputs: Rc<[Deferred<T>]> = units
            .into_iter()
            .map(|unit| Into::<Unit<T>>::into(unit).into_deferred(self))
            .collect();

        let out = self.create_deferred::<Waited<T>>();
        out.seal();

        if inputs.is_empty() || satisfied(&inputs, mode) {
            let _ = out.settle_outcome(Ok(partition(&inputs)));
            return out;
        }

        for input in inputs.iter() {
            let inputs = inputs.clone();
            let out = out.clone();
            input.add_done_callback(move |_| {
                if !out.is_done() && satisfied(&inputs, mode) {
                    let _ = out.settle_outcome(Ok(partition(&inputs)));
                }
            });
        }

        out
    }
}
