use stepwise::time::{sleep, timeout};
use stepwise::{Error, EventLoop, task};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[stepwise::test]
async fn test_timeout_completes_before_deadline() {
    let handle = task::spawn(async {
        sleep(Duration::from_millis(10)).await?;
        Ok(123)
    });

    let result = timeout(Duration::from_millis(500), handle).await;

    assert!(
        matches!(result, Ok(Ok(v)) if v == 123),
        "Timeout should return Ok(Ok(123))"
    );
}

#[stepwise::test(virtual_time)]
async fn test_timeout_expires() {
    let handle = task::spawn(async {
        sleep(Duration::from_millis(100)).await?;
        Ok(456)
    });
    let result = timeout(Duration::from_millis(20), handle.clone()).await;

    assert!(result.unwrap_err().is_timeout());
    assert!(!handle.is_done(), "time::timeout leaves the task running");
    assert_eq!(handle.await.unwrap(), 456);
}

#[stepwise::test(virtual_time)]
async fn test_with_timeout_cancels_slow_unit() {
    let handle = stepwise::handle();

    let slow = handle.submit(async {
        sleep(Duration::from_secs(10)).await?;
        Ok(1)
    });

    let outcome = handle
        .with_timeout(slow.clone(), Duration::from_secs(1))
        .await;

    assert!(matches!(outcome, Err(Error::Timeout)));
    assert!(slow.is_cancelled());
}

#[stepwise::test(virtual_time)]
async fn test_with_timeout_forwards_early_result() {
    let handle = stepwise::handle();

    let fast = handle.submit(async {
        sleep(Duration::from_millis(10)).await?;
        Ok(5)
    });

    let value = handle
        .with_timeout(fast, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(value, 5);
    assert_eq!(handle.pending_timers(), 0);
}

#[stepwise::test(virtual_time)]
async fn test_with_timeout_forwards_early_failure() {
    let handle = stepwise::handle();

    let outcome = handle
        .with_timeout::<(), _>(
            async {
                sleep(Duration::from_millis(10)).await?;
                Err::<(), _>(Error::new("refused"))
            },
            Duration::from_secs(1),
        )
        .await;

    assert_eq!(outcome.unwrap_err().to_string(), "refused");
}

#[stepwise::test(virtual_time)]
async fn test_with_timeout_waits_for_unwinding() {
    let handle = stepwise::handle();
    let cleaned = Rc::new(Cell::new(false));

    let slow = {
        let cleaned = cleaned.clone();
        handle.submit(async move {
            match sleep(Duration::from_secs(10)).await {
                Err(error) => {
                    sleep(Duration::from_millis(5)).await?;
                    cleaned.set(true);
                    Err(error)
                }
                Ok(()) => Ok(1),
            }
        })
    };

    let outcome = handle.with_timeout(slow, Duration::from_secs(1)).await;

    assert!(outcome.unwrap_err().is_timeout());
    assert!(cleaned.get());
}

#[test]
fn test_with_timeout_on_plain_deferred() {
    let rt = EventLoop::builder().virtual_time(true).build();
    let handle = rt.handle();

    let never = handle.create_deferred::<u8>();
    let bounded = handle.with_timeout(never.clone(), Duration::from_millis(50));

    assert!(rt.run_until_complete(bounded).unwrap_err().is_timeout());
    assert!(never.is_cancelled());
}

#[test]
fn test_cancelling_with_timeout_cancels_unit() {
    let rt = EventLoop::builder().virtual_time(true).build();
    let handle = rt.handle();

    let slow = handle.submit(async {
        sleep(Duration::from_secs(10)).await?;
        Ok(1)
    });
    let bounded = handle.with_timeout(slow.clone(), Duration::from_secs(1));

    rt.run_until_complete(handle.sleep(Duration::from_millis(10)))
        .unwrap();
    bounded.cancel().unwrap();

    assert!(rt.run_until_complete(bounded.clone()).unwrap_err().is_cancelled());
    assert!(slow.is_cancelled());
    assert_eq!(handle.pending_timers(), 0);
}
