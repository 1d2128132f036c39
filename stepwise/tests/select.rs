use stepwise::select;
use stepwise::time::sleep;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[stepwise::test]
async fn test_select_single_future() {
    let result = select! {
        async { 42 } => |v| v * 2,
    };

    assert_eq!(result, 84);
}

#[stepwise::test]
async fn test_select_first_branch_wins_ties() {
    let result = select! {
        async { 10 } => |v| v,
        async { 20 } => |v| v,
    };

    assert_eq!(result, 10);
}

#[stepwise::test]
async fn test_select_two_futures_different_types() {
    let result = select! {
        async { 42i32 } => |v| format!("number: {}", v),
        async { "hello" } => |v| format!("string: {}", v),
    };

    assert_eq!(result, "number: 42");
}

#[stepwise::test(virtual_time)]
async fn test_select_earliest_sleep_wins() {
    let result = select! {
        sleep(Duration::from_millis(30)) => |_| "slow",
        sleep(Duration::from_millis(10)) => |_| "fast",
        sleep(Duration::from_millis(20)) => |_| "medium",
    };

    assert_eq!(result, "fast");
}

#[stepwise::test(virtual_time)]
async fn test_select_drops_losing_timers() {
    let handle = stepwise::handle();

    select! {
        sleep(Duration::from_secs(60)) => |_| {},
        sleep(Duration::from_millis(5)) => |_| {},
    };

    assert_eq!(handle.pending_timers(), 0);
}

#[stepwise::test(virtual_time)]
async fn test_select_task_against_deadline() {
    let worker = stepwise::task::spawn(async {
        sleep(Duration::from_millis(5)).await?;
        Ok(7)
    });

    let result = select! {
        worker.clone() => |out: stepwise::Result<i32>| out.ok(),
        sleep(Duration::from_secs(1)) => |_| None,
    };

    assert_eq!(result, Some(7));
    assert!(worker.is_done());
}

#[stepwise::test]
async fn test_select_runs_only_winning_handler() {
    let calls = Rc::new(Cell::new(0));

    let c1 = calls.clone();
    let c2 = calls.clone();

    select! {
        async { 1 } => move |_| c1.set(c1.get() + 1),
        async { 2 } => move |_| c2.set(c2.get() + 10),
    };

    assert_eq!(calls.get(), 1);
}

#[stepwise::test]
async fn test_select_with_captured_values() {
    let multiplier = 10;

    let result = select! {
        async { 5 } => |v| v * multiplier,
        async { 3 } => |v| v * multiplier,
    };

    assert_eq!(result, 50);
}

#[stepwise::test]
async fn test_select_pattern_binding() {
    let result = select! {
        async { (1, 2) } => |(a, b)| a + b,
        async { (3, 4) } => |(a, b)| a * b,
    };

    assert_eq!(result, 3);
}
