use super::Unit;
use crate::deferred::{Deferred, Dependency};
use crate::error::Error;
use crate::runtime::Handle;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

impl Handle {
    /// Bounds `unit` by `duration`.
    ///
    /// If the unit completes first, the timer is cancelled and the outcome
    /// forwarded. If the timer fires first, the unit is cancelled and the
    /// returned deferred result fails with [`Error::Timeout`] once the unit
    /// has finished unwinding. Cancelling the returned deferred result
    /// cancels the unit.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stepwise::{EventLoop, time};
    /// use std::time::Duration;
    ///
    /// let rt = EventLoop::builder().virtual_time(true).build();
    /// let handle = rt.handle();
    ///
    /// let slow = handle.submit(async {
    ///     time::sleep(Duration::from_secs(10)).await?;
    ///     Ok("finished")
    /// });
    /// let bounded = handle.with_timeout(slow.clone(), Duration::from_secs(1));
    ///
    /// assert!(rt.run_until_complete(bounded).unwrap_err().is_timeout());
    /// assert!(slow.is_cancelled());
    /// ```
    pub fn with_timeout<T, U>(&self, unit: U, duration: Duration) -> Deferred<T>
    where
        T: Clone + 'static,
        U: Into<Unit<T>>,
    {
        let target = Into::<Unit<T>>::into(unit).into_deferred(self);

        let out = self.create_deferred::<T>();
        out.seal();

        let fired = Rc::new(Cell::new(false));

        let timer = {
            let target = target.clone();
            let fired = fired.clone();
            self.call_later(duration, move || {
                if target.is_done() {
                    return;
                }

                debug!(?duration, "deadline passed; cancelling");
                fired.set(true);
                let _ = target.cancel();
            })
        };

        {
            let out = out.clone();
            target.add_done_callback(move |target| {
                timer.cancel();

                if fired.get() && target.is_cancelled() {
                    let _ = target.error();
                    let _ = out.settle_outcome(Err(Error::Timeout));
                } else {
                    target.forward_to(&out);
                }
            });
        }

        let dependency = target.as_dependency();
        out.set_cancel_hook(Box::new(move || {
            dependency
                .upgrade()
                .is_some_and(|target| target.cancel_dependency())
        }));

        out
    }
}
