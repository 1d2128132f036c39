use stepwise::time::sleep;
use stepwise::{Error, EventLoop, Handle, LoopState, yield_now};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn log() -> Rc<RefCell<Vec<&'static str>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn test_callbacks_run_in_fifo_order() {
    let rt = EventLoop::new();
    let handle = rt.handle();
    let log = log();

    for name in ["a", "b", "c"] {
        let log = log.clone();
        handle.call_soon(move || log.borrow_mut().push(name));
    }

    rt.run_until_complete(yield_now()).unwrap();

    assert_eq!(*log.borrow(), ["a", "b", "c"]);
}

#[test]
fn test_callback_scheduled_during_pass_waits_for_next_pass() {
    let rt = EventLoop::new();
    let handle = rt.handle();
    let log = log();

    let a = {
        let log = log.clone();
        handle.submit(async move {
            let late = log.clone();
            stepwise::handle().call_soon(move || late.borrow_mut().push("C"));
            log.borrow_mut().push("A");
            Ok(())
        })
    };
    let b = {
        let log = log.clone();
        handle.submit(async move {
            log.borrow_mut().push("B");
            Ok(())
        })
    };

    rt.run_until_complete(handle.join_all([a, b], Default::default()))
        .unwrap();
    rt.run_until_complete(yield_now()).unwrap();

    assert_eq!(*log.borrow(), ["A", "B", "C"]);
}

fn spin(handle: Handle, spins: Rc<Cell<u32>>, limit: u32) {
    if spins.get() == limit {
        return;
    }
    spins.set(spins.get() + 1);

    let next = handle.clone();
    handle.call_soon(move || spin(next, spins, limit));
}

#[test]
fn test_self_rescheduling_callback_does_not_starve_due_timer() {
    let rt = EventLoop::builder().virtual_time(true).build();
    let handle = rt.handle();
    let spins = Rc::new(Cell::new(0));
    let seen = handle.create_deferred::<u32>();

    {
        let handle = handle.clone();
        let spins = spins.clone();
        let seen = seen.clone();
        rt.handle().call_soon(move || {
            let observed = spins.clone();
            handle.call_later(Duration::ZERO, move || {
                let _ = seen.resolve(observed.get());
            });
            spin(handle, spins, 1000);
        });
    }

    // The timer is due when the pass that armed it ends, so it runs right
    // after the single spin queued during that pass.
    assert_eq!(rt.run_until_complete(seen).unwrap(), 2);
    assert!(spins.get() < 1000);
}

#[test]
fn test_yielding_tasks_interleave() {
    let rt = EventLoop::new();
    let handle = rt.handle();
    let log = log();

    let tasks: Vec<_> = [("x", ["x1", "x2"]), ("y", ["y1", "y2"])]
        .into_iter()
        .map(|(name, steps)| {
            let log = log.clone();
            handle.submit_named(name, async move {
                for step in steps {
                    log.borrow_mut().push(step);
                    yield_now().await?;
                }
                Ok(())
            })
        })
        .collect();

    rt.run_until_complete(handle.join_all(tasks, Default::default()))
        .unwrap();

    assert_eq!(*log.borrow(), ["x1", "y1", "x2", "y2"]);
}

#[test]
fn test_timers_fire_by_deadline_then_submission() {
    let rt = EventLoop::builder().virtual_time(true).build();
    let handle = rt.handle();
    let log = log();

    for (delay, name) in [(30, "c"), (10, "a"), (10, "b")] {
        let log = log.clone();
        handle.call_later(Duration::from_millis(delay), move || {
            log.borrow_mut().push(name)
        });
    }

    let start = handle.now();
    rt.run_until_complete(handle.sleep(Duration::from_millis(50)))
        .unwrap();

    assert_eq!(*log.borrow(), ["a", "b", "c"]);
    assert_eq!(handle.now() - start, Duration::from_millis(50));
}

#[test]
fn test_cancelled_timer_never_fires() {
    let rt = EventLoop::builder().virtual_time(true).build();
    let handle = rt.handle();
    let log = log();

    let timer = {
        let log = log.clone();
        handle.call_later(Duration::from_millis(10), move || log.borrow_mut().push("fired"))
    };

    assert_eq!(handle.pending_timers(), 1);
    assert!(timer.cancel());
    assert!(!timer.cancel());
    assert_eq!(handle.pending_timers(), 0);

    rt.run_until_complete(handle.sleep(Duration::from_millis(20)))
        .unwrap();

    assert!(log.borrow().is_empty());
    assert!(timer.is_cancelled());
    assert!(!timer.has_fired());
}

#[test]
fn test_system_clock_never_fires_early() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let start = std::time::Instant::now();
    let fired_at = Rc::new(RefCell::new(None));

    {
        let fired_at = fired_at.clone();
        handle.call_later(Duration::from_millis(20), move || {
            *fired_at.borrow_mut() = Some(std::time::Instant::now());
        });
    }

    rt.run_until_complete(handle.sleep(Duration::from_millis(30)))
        .unwrap();

    let fired_at = fired_at.borrow().expect("timer fired");
    assert!(fired_at - start >= Duration::from_millis(20));
}

#[test]
fn test_panicking_callback_does_not_stop_the_loop() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    handle.call_soon(|| panic!("callback failure"));

    let value = rt
        .block_on(async {
            yield_now().await.unwrap();
            5
        })
        .unwrap();

    assert_eq!(value, 5);
}

#[test]
fn test_run_until_complete_is_not_reentrant() {
    let rt = Rc::new(EventLoop::new());
    let inner = rt.clone();

    let nested = rt
        .block_on(async move { inner.run_until_complete(async { Ok(1) }) })
        .unwrap();

    assert!(matches!(nested, Err(Error::InvalidState(_))));
}

#[test]
fn test_loop_can_be_run_again() {
    let rt = EventLoop::new();
    assert_eq!(rt.state(), LoopState::NotStarted);

    assert_eq!(rt.run_until_complete(async { Ok(1) }).unwrap(), 1);
    assert_eq!(rt.state(), LoopState::Stopped);

    assert_eq!(rt.run_until_complete(async { Ok(2) }).unwrap(), 2);
}

#[test]
fn test_stalled_root_is_reported() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let never = handle.create_deferred::<u8>();
    let waiter = {
        let never = never.clone();
        handle.submit(async move { never.await })
    };

    assert!(matches!(rt.run_until_complete(waiter), Err(Error::Stalled)));
    assert!(matches!(rt.run_until_complete(never), Err(Error::Stalled)));
}

#[test]
fn test_foreign_future_wakes_the_loop() {
    let rt = EventLoop::new();
    let (tx, rx) = futures::channel::oneshot::channel::<u32>();

    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        let _ = tx.send(7);
    });

    let value = rt
        .run_until_complete(async move { rx.await.map_err(Error::new) })
        .unwrap();

    assert_eq!(value, 7);
}

#[test]
fn test_block_on_reports_panics() {
    let rt = EventLoop::new();

    let outcome = rt.block_on(async {
        sleep(Duration::ZERO).await.unwrap();
        let empty: Option<u8> = None;
        empty.expect("no value")
    });

    assert!(matches!(outcome, Err(Error::Panicked(message)) if message.contains("no value")));
}

#[test]
fn test_slow_callbacks_do_not_disturb_the_loop() {
    let rt = EventLoop::builder()
        .slow_callback_duration(Duration::from_millis(1))
        .build();
    rt.handle()
        .call_soon(|| std::thread::sleep(Duration::from_millis(5)));
    assert_eq!(rt.block_on(async { 1 }).unwrap(), 1);

    let quiet = EventLoop::builder().disable_slow_callback_warnings().build();
    quiet
        .handle()
        .call_soon(|| std::thread::sleep(Duration::from_millis(5)));
    assert_eq!(quiet.block_on(async { 2 }).unwrap(), 2);
}

#[test]
fn test_ambient_handle_only_inside_the_loop() {
    assert!(stepwise::try_handle().is_none());

    let rt = EventLoop::new();
    let inside = rt
        .block_on(async { stepwise::try_handle().map(|handle| handle.is_running()) })
        .unwrap();

    assert_eq!(inside, Some(true));
    assert!(!rt.handle().is_running());
    assert!(stepwise::try_handle().is_none());
}
