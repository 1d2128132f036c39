use stepwise::{Error, EventLoop};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn test_notifier_call_soon_from_threads() {
    let rt = EventLoop::new();
    let handle = rt.handle();
    let counter = Arc::new(AtomicUsize::new(0));

    let done = handle.create_deferred::<()>();
    let token = {
        let done = done.clone();
        handle.ready_token(move || {
            let _ = done.resolve(());
        })
    };

    let notifier = handle.notifier();
    let counter_clone = counter.clone();
    thread::spawn(move || {
        for _ in 0..4 {
            let counter = counter_clone.clone();
            notifier.call_soon(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        token.signal();
    });

    rt.run_until_complete(done).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[test]
fn test_ready_token_signal_runs_callback_on_loop_thread() {
    let rt = EventLoop::new();
    let handle = rt.handle();
    let loop_thread = thread::current().id();

    let done = handle.create_deferred::<bool>();
    let token = {
        let done = done.clone();
        handle.ready_token(move || {
            let _ = done.resolve(thread::current().id() == loop_thread);
        })
    };

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        token.signal();
    });

    assert!(rt.run_until_complete(done).unwrap());
}

#[test]
fn test_dropped_ready_token_discards_callback() {
    let rt = EventLoop::new();
    let handle = rt.handle();
    let ran = Rc::new(Cell::new(false));

    let token = {
        let ran = ran.clone();
        handle.ready_token(move || ran.set(true))
    };
    drop(token);

    let never = handle.create_deferred::<()>();
    assert!(matches!(rt.run_until_complete(never), Err(Error::Stalled)));
    assert!(!ran.get());
}

#[test]
fn test_live_notifier_prevents_stall() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let done = handle.create_deferred::<u8>();
    let notifier = handle.notifier();

    let finished = {
        let done = done.clone();
        handle.ready_token(move || {
            let _ = done.resolve(3);
        })
    };

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        notifier.wake();
        thread::sleep(Duration::from_millis(20));
        finished.signal();
        drop(notifier);
    });

    assert_eq!(rt.run_until_complete(done).unwrap(), 3);
}
