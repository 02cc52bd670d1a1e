use ::std::{
    future::Future,
    pin::Pin,
    task::{Context, Waker},
    time::Duration,
};

use crate::prelude::*;

#[test]
fn trivial ()
{
    let _ = ::env_logger::try_init();

    let mut task = Task::new(async { 1 });
    assert!(! task.valueless());

    task.wait();
    assert!(! task.valueless());

    assert_eq!(*task.get(), 1);
    assert!(! task.valueless());
}

#[test]
fn wait_and_get_are_idempotent ()
{
    let mut task = Task::new(async { String::from("once") });
    task.wait();
    task.wait();
    assert_eq!(task.get(), "once");
    assert_eq!(task.get(), "once");
}

#[test]
fn wait_until_on_a_done_task_reports_done ()
{
    let mut task = Task::new(async { 27 });
    task.wait();
    assert!(task.wait_for(Duration::ZERO));
    assert_eq!(*task.get(), 27);
}

#[test]
fn awaiting_an_already_finished_task_does_not_suspend ()
{
    let mut finished = Task::new(async { 21 });
    finished.wait();

    let mut task = Task::new(async move { finished.await * 2 });
    assert_eq!(*task.get(), 42);
}

#[test]
fn checkpoints_without_a_deadline_never_pause ()
{
    let mut task = Task::new(async {
        let mut acc = 0_u32;
        for i in 0 .. 4 {
            progress().await;
            acc += i;
        }
        acc
    });
    // a plain `wait` installs no policy: one resume runs to completion
    task.wait();
    assert_eq!(*task.get(), 6);
}

#[test]
fn an_empty_generator_begins_at_its_end ()
{
    let mut task = Task::new(async {
        let iter = Generator::<u32>::new(|_co| async {}).begin().await;
        iter.is_done()
    });
    assert!(*task.get());
}

#[test]
fn yield_iter_matches_manual_yields ()
{
    fn by_hand ()
      -> Generator<u32>
    {
        Generator::new(|co| async move {
            co.yield_(2).await;
            co.yield_(3).await;
            co.yield_(4).await;
        })
    }

    fn by_range ()
      -> Generator<u32>
    {
        Generator::new(|co| async move {
            co.yield_iter(2 ..= 4).await;
        })
    }

    let mut task = Task::new(async {
        let mut left = vec![];
        co_for!(n in by_hand() => {
            left.push(*n);
        });
        let mut right = vec![];
        co_for!(n in by_range() => {
            right.push(*n);
        });
        (left, right)
    });
    let (left, right) = task.get();
    assert_eq!(left, right);
    assert_eq!(*left, [2, 3, 4]);
}

#[test]
fn a_body_may_drive_an_unrelated_root ()
{
    let mut task = Task::new(async {
        // a nested, fully synchronous driver on a root of its own
        let mut other = Task::new(async { 5 });
        other.wait();
        *other.get() + 1
    });
    assert_eq!(*task.get(), 6);
}

#[test]
#[should_panic(expected = "outside of a driven coroutine")]
fn awaitables_demand_a_driven_frame ()
{
    let mut checkpoint = Box::pin(progress());
    let _ = Pin::as_mut(&mut checkpoint)
        .poll(&mut Context::from_waker(Waker::noop()));
}
