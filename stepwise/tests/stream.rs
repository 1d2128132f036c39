use futures::StreamExt;
use stepwise::time::sleep;
use stepwise::{Error, EventLoop, Handle, Task};
use std::time::Duration;

fn after(handle: &Handle, ms: u64) -> Task<u64> {
    handle.submit(async move {
        sleep(Duration::from_millis(ms)).await?;
        Ok(ms)
    })
}

#[stepwise::test(virtual_time)]
async fn test_completed_yields_in_completion_order() {
    let handle = stepwise::handle();
    let units = [30, 10, 20].map(|ms| after(&handle, ms));

    let mut order = Vec::new();
    for next in handle.stream_completed(units) {
        order.push(next.await.unwrap());
    }

    assert_eq!(order, [10, 20, 30]);
}

#[stepwise::test(virtual_time)]
async fn test_completed_is_exact_size_and_finite() {
    let handle = stepwise::handle();
    let mut completed = handle.stream_completed([after(&handle, 5), after(&handle, 1)]);

    assert_eq!(completed.len(), 2);

    let first = completed.next().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(first.await.unwrap(), 1);

    let second = completed.next().unwrap();
    assert_eq!(second.await.unwrap(), 5);

    assert!(completed.next().is_none());
    assert!(completed.next().is_none());
}

#[stepwise::test(virtual_time)]
async fn test_completed_stream_reports_failures() {
    let handle = stepwise::handle();

    let failing = handle.submit(async {
        sleep(Duration::from_millis(10)).await?;
        Err::<u64, _>(Error::new("lost"))
    });
    let units = [after(&handle, 20), failing];

    let outcomes: Vec<_> = handle
        .stream_completed(units)
        .into_stream()
        .collect()
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].as_ref().unwrap_err().to_string(), "lost");
    assert_eq!(*outcomes[1].as_ref().unwrap(), 20);
}

#[test]
fn test_completed_without_inputs() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let mut completed = handle.stream_completed(Vec::<Task<u8>>::new());

    assert_eq!(completed.len(), 0);
    assert!(completed.next().is_none());
}
