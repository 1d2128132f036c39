use super::TaskId;
use crate::runtime::remote::{Remote, Signal};

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Data behind a task's [`Waker`].
///
/// Tasks themselves are `Rc` and never leave the loop thread, so the
/// waker only carries the task identity and the loop's thread-safe inbox.
/// Waking pushes a [`Signal::Wake`] that the loop turns into a step.
pub(crate) struct WakeSignal {
    task: TaskId,
    remote: Arc<Remote>,
}

impl WakeSignal {
    fn wake(&self) {
        self.remote.push(Signal::Wake(self.task));
    }
}

/// The `RawWakerVTable` shared by every task waker.
///
/// All functions uphold the [`RawWaker`] contract: the data pointer always
/// originates from `Arc::<WakeSignal>::into_raw`, and each clone owns one
/// strong reference that is released exactly once.
static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

/// Creates the [`Waker`] used when a task polls futures that are not
/// deferred results (foreign futures, `yield_now` outside a task, ...).
pub(crate) fn make_waker(task: TaskId, remote: Arc<Remote>) -> Waker {
    let signal = Arc::new(WakeSignal { task, remote });

    // SAFETY: the pointer comes from `Arc::into_raw` and `VTABLE` manages
    // the reference count accordingly.
    unsafe { Waker::from_raw(RawWaker::new(Arc::into_raw(signal).cast(), &VTABLE)) }
}

/// Clones the raw waker by bumping the strong count.
unsafe fn clone_raw(ptr: *const ()) -> RawWaker {
    // SAFETY: `ptr` is a live `Arc<WakeSignal>` pointer per the vtable contract.
    unsafe { Arc::increment_strong_count(ptr.cast::<WakeSignal>()) };
    RawWaker::new(ptr, &VTABLE)
}

/// Wakes the task and consumes the waker's reference.
unsafe fn wake_raw(ptr: *const ()) {
    // SAFETY: takes back the reference owned by this waker.
    let signal = unsafe { Arc::from_raw(ptr.cast::<WakeSignal>()) };
    signal.wake();
}

/// Wakes the task without consuming the waker.
unsafe fn wake_by_ref_raw(ptr: *const ()) {
    // SAFETY: borrowed view; `ManuallyDrop` keeps the count unchanged.
    let signal = ManuallyDrop::new(unsafe { Arc::from_raw(ptr.cast::<WakeSignal>()) });
    signal.wake();
}

/// Releases the waker's reference.
unsafe fn drop_raw(ptr: *const ()) {
    // SAFETY: takes back the reference owned by this waker.
    drop(unsafe { Arc::from_raw(ptr.cast::<WakeSignal>()) });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_and_clone_push_signals() {
        let remote = Arc::new(Remote::new());
        let waker = make_waker(TaskId::new(7), remote.clone());

        let clone = waker.clone();
        clone.wake();
        waker.wake_by_ref();
        drop(waker);

        let signals = remote.take();
        assert_eq!(signals.len(), 2);
        assert!(
            signals
                .iter()
                .all(|signal| matches!(signal, Signal::Wake(id) if *id == TaskId::new(7)))
        );
        assert_eq!(Arc::strong_count(&remote), 1);
    }
}
