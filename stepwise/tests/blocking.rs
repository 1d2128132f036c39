use stepwise::{Error, EventLoop, task};
use std::thread;
use std::time::Duration;

#[test]
fn test_spawn_blocking_returns_value() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let sum = handle.spawn_blocking(|| {
        thread::sleep(Duration::from_millis(10));
        (1..=10_u64).sum::<u64>()
    });

    assert_eq!(rt.run_until_complete(sum).unwrap(), 55);
}

#[test]
fn test_spawn_blocking_runs_off_the_loop_thread() {
    let rt = EventLoop::new();
    let loop_thread = thread::current().id();

    let worker_thread = rt
        .block_on(async { task::spawn_blocking(|| thread::current().id()).await })
        .unwrap()
        .unwrap();

    assert_ne!(worker_thread, loop_thread);
}

#[test]
fn test_spawn_blocking_panic_is_reported() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let failed = handle.spawn_blocking(|| -> u8 { panic!("worker gave up") });

    let outcome = rt.run_until_complete(failed);
    assert!(matches!(outcome, Err(Error::Panicked(message)) if message == "worker gave up"));
}

#[stepwise::test]
async fn test_loop_keeps_running_while_blocking_work_runs() {
    let ticks = std::rc::Rc::new(std::cell::Cell::new(0));

    let slow = task::spawn_blocking(|| {
        thread::sleep(Duration::from_millis(50));
        "slow"
    });

    let ticker = {
        let ticks = ticks.clone();
        task::spawn(async move {
            for _ in 0..3 {
                stepwise::time::sleep(Duration::from_millis(1)).await?;
                ticks.set(ticks.get() + 1);
            }
            Ok(())
        })
    };

    ticker.await.unwrap();
    assert_eq!(ticks.get(), 3);
    assert_eq!(slow.await.unwrap(), "slow");
}
