use super::Unit;
use crate::deferred::{Deferred, Dependency};
use crate::error::{Error, Result};
use crate::runtime::Handle;

use std::cell::Cell;
use std::rc::{Rc, Weak};

use tracing::trace;

/// How [`Handle::join_all`] treats failed inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinPolicy {
    /// The first failure or cancellation rejects the aggregate right away.
    /// Other inputs keep running; their outcomes are discarded.
    #[default]
    FailFast,

    /// Wait for every input; failed entries carry their error.
    CollectAll,
}

struct Join<T> {
    children: Vec<Deferred<T>>,
    remaining: Cell<usize>,
    policy: JoinPolicy,
    aggregate: Deferred<Vec<Result<T>>>,
    cancel_requested: Rc<Cell<bool>>,
}

impl<T: Clone + 'static> Join<T> {
    fn child_done(&self, child: &Deferred<T>) {
        self.remaining.set(self.remaining.get() - 1);

        if self.aggregate.is_done() {
            // Read it so a late failure is not reported as unobserved.
            let _ = child.outcome();
            return;
        }

        if self.policy == JoinPolicy::FailFast {
            if let Some(Err(error)) = child.outcome() {
                trace!(%error, "join failed fast");
                let _ = self.aggregate.settle_outcome(Err(error));
                return;
            }
        }

        if self.remaining.get() > 0 {
            return;
        }

        if self.cancel_requested.get() {
            let _ = self.aggregate.settle_outcome(Err(Error::Cancelled));
            return;
        }

        let outcomes = self
            .children
            .iter()
            .map(|child| {
                child
                    .outcome()
                    .unwrap_or(Err(Error::InvalidState("joined input is still pending")))
            })
            .collect();

        let _ = self.aggregate.settle_outcome(Ok(outcomes));
    }
}

impl Handle {
    /// Runs every unit concurrently and collects their outcomes in
    /// submission order.
    ///
    /// Cancelling the returned deferred result cancels every input that has
    /// not finished; the aggregate then ends cancelled. An empty input
    /// resolves to an empty vector.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stepwise::{EventLoop, JoinPolicy, Unit};
    ///
    /// let rt = EventLoop::new();
    /// let handle = rt.handle();
    ///
    /// let units: Vec<Unit<u32>> = (1..=3_u32).map(|n| Unit::from(async move { Ok(n * 10) })).collect();
    /// let all = handle.join_all(units, JoinPolicy::CollectAll);
    ///
    /// let outcomes = rt.run_until_complete(all).unwrap();
    /// let values: Vec<u32> = outcomes.into_iter().map(Result::unwrap).collect();
    /// assert_eq!(values, vec![10, 20, 30]);
    /// ```
    pub fn join_all<T, I, U>(&self, units: I, policy: JoinPolicy) -> Deferred<Vec<Result<T>>>
    where
        T: Clone + 'static,
        I: IntoIterator<Item = U>,
        U: Into<Unit<T>>,
    {
        let children: Vec<Deferred<T>> = units
            .into_iter()
            .map(|unit| Into::<Unit<T>>::into(unit).into_deferred(self))
            .collect();

        let aggregate = self.create_deferred::<Vec<Result<T>>>();
        aggregate.seal();

        if children.is_empty() {
            let _ = aggregate.settle_outcome(Ok(Vec::new()));
            return aggregate;
        }

        let cancel_requested = Rc::new(Cell::new(false));

        let dependencies: Vec<Weak<_>> = children.iter().map(Deferred::as_dependency).collect();
        let requested = cancel_requested.clone();
        aggregate.set_cancel_hook(Box::new(move || {
            requested.set(true);
            dependencies
                .iter()
                .filter_map(Weak::upgrade)
                .fold(false, |accepted, child| child.cancel_dependency() || accepted)
        }));

        let join = Rc::new(Join {
            remaining: Cell::new(children.len()),
            children: children.clone(),
            policy,
            aggregate: aggregate.clone(),
            cancel_requested,
        });

        for child in &children {
            let join = join.clone();
            child.add_done_callback(move |child| join.child_done(child));
        }

        aggregate
    }
}
