use stepwise::time::sleep;
use stepwise::{Error, EventLoop, Result, TaskState, task, yield_now};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn explode() -> Result<u8> {
    panic!("boom")
}

#[test]
fn test_task_runs_to_completion() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let job = handle.submit(async {
        yield_now().await?;
        Ok(21 * 2)
    });
    assert_eq!(job.state(), TaskState::Created);

    assert_eq!(rt.run_until_complete(job.clone()).unwrap(), 42);
    assert_eq!(job.state(), TaskState::Done);
    assert_eq!(job.result().unwrap(), 42);
}

#[test]
fn test_cancel_suspended_task_cancels_its_dependency() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let d = handle.create_deferred::<u32>();
    let waiter = {
        let d = d.clone();
        handle.submit(async move { d.await })
    };

    rt.run_until_complete(yield_now()).unwrap();
    assert_eq!(waiter.state(), TaskState::Suspended);

    waiter.cancel().unwrap();
    assert!(d.is_cancelled());
    assert_eq!(waiter.state(), TaskState::Cancelling);

    let outcome = rt.run_until_complete(waiter.clone());
    assert!(outcome.unwrap_err().is_cancelled());
    assert_eq!(waiter.state(), TaskState::Cancelled);
}

#[test]
fn test_cancelled_task_can_clean_up() {
    let rt = EventLoop::builder().virtual_time(true).build();
    let handle = rt.handle();
    let cleaned = Rc::new(Cell::new(false));

    let worker = {
        let cleaned = cleaned.clone();
        handle.submit(async move {
            match sleep(Duration::from_secs(60)).await {
                Err(error) if error.is_cancelled() => {
                    sleep(Duration::from_millis(5)).await?;
                    cleaned.set(true);
                    Err(error)
                }
                outcome => outcome,
            }
        })
    };

    rt.run_until_complete(yield_now()).unwrap();
    worker.cancel().unwrap();

    assert!(rt.run_until_complete(worker.clone()).unwrap_err().is_cancelled());
    assert!(cleaned.get());
    assert!(worker.is_cancelled());
}

#[test]
fn test_task_cancelled_while_yielding_can_clean_up() {
    let rt = EventLoop::new();
    let handle = rt.handle();
    let cleaned = Rc::new(Cell::new(false));

    let worker = {
        let cleaned = cleaned.clone();
        handle.submit(async move {
            loop {
                if let Err(error) = yield_now().await {
                    cleaned.set(true);
                    return Err::<(), _>(error);
                }
            }
        })
    };

    {
        let worker = worker.clone();
        handle.call_soon(move || worker.cancel().unwrap());
    }

    assert!(rt.run_until_complete(worker.clone()).unwrap_err().is_cancelled());
    assert!(cleaned.get());
    assert!(worker.is_cancelled());
}

#[test]
fn test_task_may_swallow_cancellation() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let d = handle.create_deferred::<u32>();
    let stubborn = {
        let d = d.clone();
        handle.submit(async move { Ok(d.await.unwrap_or(99)) })
    };

    rt.run_until_complete(yield_now()).unwrap();
    stubborn.cancel().unwrap();

    assert_eq!(rt.run_until_complete(stubborn.clone()).unwrap(), 99);
    assert_eq!(stubborn.state(), TaskState::Done);
}

#[test]
fn test_cancel_before_first_step() {
    let rt = EventLoop::new();
    let handle = rt.handle();
    let started = Rc::new(Cell::new(false));

    let job = {
        let started = started.clone();
        handle.submit(async move {
            started.set(true);
            Ok(())
        })
    };

    job.cancel().unwrap();
    job.cancel().unwrap();

    assert!(rt.run_until_complete(job.clone()).unwrap_err().is_cancelled());
    assert!(!started.get());
}

#[test]
fn test_cancel_finished_task_is_invalid() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let job = handle.submit(async { Ok(1) });
    rt.run_until_complete(job.clone()).unwrap();

    assert!(matches!(job.cancel(), Err(Error::InvalidState(_))));
    assert!(matches!(job.deferred().cancel(), Err(Error::InvalidState(_))));
}

#[test]
fn test_cancelling_task_deferred_cancels_the_task() {
    let rt = EventLoop::builder().virtual_time(true).build();
    let handle = rt.handle();

    let job = handle.submit(async {
        sleep(Duration::from_secs(5)).await?;
        Ok(1)
    });

    rt.run_until_complete(yield_now()).unwrap();
    job.deferred().cancel().unwrap();

    assert!(rt.run_until_complete(job.clone()).unwrap_err().is_cancelled());
    assert!(job.is_cancelled());
}

#[test]
fn test_panicking_task_fails_with_panicked() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    let job = handle.submit(async { explode() });
    let bystander = handle.submit(async { Ok(1) });

    let outcome = rt.run_until_complete(job.clone());
    assert!(matches!(outcome, Err(Error::Panicked(message)) if message == "boom"));
    assert_eq!(job.state(), TaskState::Done);

    assert_eq!(rt.run_until_complete(bystander).unwrap(), 1);
}

#[stepwise::test]
async fn test_tasks_get_default_and_explicit_names() {
    let anonymous = task::spawn(async { Ok(()) });
    let named = task::spawn_named("worker", async { Ok(()) });

    assert_eq!(anonymous.name(), format!("Task-{}", anonymous.id()));
    assert_eq!(named.name(), "worker");
    assert_eq!(named.id().as_u64(), anonymous.id().as_u64() + 1);
}

#[stepwise::test]
async fn test_current_task_inside_computation() {
    let job = task::spawn_named("reporter", async {
        Ok(task::current().map(|info| (info.name, info.state)))
    });

    let seen = job.await.unwrap();
    assert_eq!(seen, Some(("reporter".to_string(), TaskState::Running)));
}

#[test]
fn test_current_task_outside_task_is_none() {
    let rt = EventLoop::new();
    let handle = rt.handle();

    assert!(task::current().is_none());
    assert!(handle.current_task().is_none());

    let seen = Rc::new(Cell::new(true));
    {
        let seen = seen.clone();
        handle.call_soon(move || seen.set(stepwise::handle().current_task().is_some()));
    }
    rt.run_until_complete(yield_now()).unwrap();

    assert!(!seen.get());
}

#[stepwise::test(virtual_time)]
async fn test_all_tasks_lists_unfinished_tasks() {
    let handle = stepwise::handle();

    let sleeper = handle.submit_named("sleeper", async {
        sleep(Duration::from_millis(10)).await?;
        Ok(())
    });
    let quick = handle.submit_named("quick", async { Ok(()) });

    let names: Vec<String> = handle.all_tasks().into_iter().map(|info| info.name).collect();
    assert!(names.contains(&"sleeper".to_string()));
    assert!(names.contains(&"quick".to_string()));

    quick.await.unwrap();
    let names: Vec<String> = handle.all_tasks().into_iter().map(|info| info.name).collect();
    assert!(names.contains(&"sleeper".to_string()));
    assert!(!names.contains(&"quick".to_string()));

    sleeper.await.unwrap();
    assert_eq!(handle.all_tasks().len(), 1);
}
