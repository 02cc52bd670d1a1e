use ::std::{
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use ::recoro::prelude::*;

fn flipflop ()
  -> Generator<u64>
{
    Generator::new(|co| async move {
        let mut current = 0;
        for _ in 0 .. 8 {
            co.yield_(current).await;
            current = 1 - current;
        }
    })
}

fn iota (up_to: u64)
  -> Generator<u64>
{
    Generator::new(move |co| async move {
        co.delegate(flipflop()).await;
        for n in 0 .. up_to {
            co.yield_(n).await;
        }
    })
}

fn fibonacci ()
  -> Generator<u64>
{
    Generator::new(|co| async move {
        co.delegate(iota(10)).await;
        let (mut previous, mut current) = (0_u64, 1);
        loop {
            co.yield_(current).await;
            let next = previous + current;
            previous = current;
            current = next;
        }
    })
}

/// Runs `generator` to exhaustion from inside a task and returns every
/// yielded element.
fn collect (generator: Generator<u64>)
  -> Vec<u64>
{
    let mut task = Task::new(async move {
        let mut collected = vec![];
        co_for!(n in generator => {
            collected.push(*n);
        });
        collected
    });
    task.get().clone()
}

#[test]
fn a_task_consumes_a_generator_element_by_element ()
{
    let _ = ::env_logger::try_init();

    let mut task = Task::new(async {
        let mut collected = vec![];
        let mut iter = flipflop().begin().await;
        while !iter.is_done() {
            collected.push(*iter.get());
            iter.advance().await;
        }
        collected
    });
    assert_eq!(*task.get(), [0, 1, 0, 1, 0, 1, 0, 1]);
}

#[test]
fn co_for_is_the_same_iteration ()
{
    let _ = ::env_logger::try_init();

    assert_eq!(collect(flipflop()), [0, 1, 0, 1, 0, 1, 0, 1]);
}

#[test]
fn delegation_interleaved_with_task_awaits ()
{
    let _ = ::env_logger::try_init();

    let mut expected: Vec<u64> = vec![0, 1, 0, 1, 0, 1, 0, 1];
    expected.extend(0 .. 10);
    let (mut previous, mut current) = (0_u64, 1);
    loop {
        expected.push(current);
        if current > 1_000 {
            break;
        }
        let next = previous + current;
        previous = current;
        current = next;
    }

    let prints = Rc::new(RefCell::new(Vec::new()));
    let mut task = Task::new({
        let prints = Rc::clone(&prints);
        async move {
            let mut collected = vec![];
            let mut iter = fibonacci().begin().await;
            while !iter.is_done() {
                let value = *iter.get();
                collected.push(value);
                // a nested void task runs to completion at every step
                Task::new({
                    let prints = Rc::clone(&prints);
                    async move {
                        prints.borrow_mut().push(format!("saw {value}"));
                    }
                }).await;
                if value > 1_000 {
                    break;
                }
                iter.advance().await;
            }
            collected
        }
    });

    assert_eq!(*task.get(), expected);
    assert_eq!(
        *prints.borrow(),
        expected
            .iter()
            .map(|value| format!("saw {value}"))
            .collect::<Vec<_>>(),
    );
}

#[test]
fn delegation_is_associative ()
{
    let _ = ::env_logger::try_init();

    fn leaf (range: ::std::ops::Range<u64>)
      -> Generator<u64>
    {
        Generator::new(move |co| async move {
            co.yield_iter(range).await;
        })
    }

    // outer -> (middle -> inner), with own elements at every level
    let chained = Generator::new(|co| async move {
        co.delegate(Generator::new(|co| async move {
            co.delegate(leaf(0 .. 3)).await;
            co.yield_iter(3 .. 5).await;
        })).await;
        co.yield_iter(5 .. 7).await;
    });

    // the same sequence, delegated one level at a time
    let flattened = Generator::new(|co| async move {
        co.delegate(leaf(0 .. 3)).await;
        co.yield_iter(3 .. 5).await;
        co.yield_iter(5 .. 7).await;
    });

    let chained = collect(chained);
    assert_eq!(chained, collect(flattened));
    assert_eq!(chained, (0 .. 7).collect::<Vec<_>>());
}

#[test]
fn delegating_an_empty_generator_yields_nothing ()
{
    let _ = ::env_logger::try_init();

    let generator = Generator::new(|co| async move {
        co.yield_(1).await;
        co.delegate(Generator::new(|_co| async {})).await;
        co.yield_(2).await;
    });
    assert_eq!(collect(generator), [1, 2]);
}

#[test]
fn a_generator_may_await_tasks ()
{
    let _ = ::env_logger::try_init();

    let generator = Generator::new(|co| async move {
        let base = Task::new(async { 40 }).await;
        co.yield_(base + 2).await;
    });
    assert_eq!(collect(generator), [42]);
}

#[test]
fn iteration_works_from_a_nested_task ()
{
    let _ = ::env_logger::try_init();

    let mut outer = Task::new(async {
        let consumer = Task::new(async {
            let mut sum = 0;
            co_for!(n in iota(4) => {
                sum += *n;
            });
            sum
        });
        consumer.await
    });
    // flipflop contributes 4, iota's own elements 0 + 1 + 2 + 3
    assert_eq!(*outer.get(), 4 + 6);
}

#[test]
fn a_generator_may_consume_another_generator_without_delegating ()
{
    let _ = ::env_logger::try_init();

    // iterating (rather than delegating) gives the outer generator a chance
    // to transform every element
    let doubled = Generator::new(|co| async move {
        co_for!(n in flipflop() => {
            co.yield_(*n * 2).await;
        });
    });
    assert_eq!(collect(doubled), [0, 2, 0, 2, 0, 2, 0, 2]);
}

#[test]
fn a_panic_inside_a_delegatee_unwinds_level_by_level ()
{
    let _ = ::env_logger::try_init();

    let seen = Rc::new(RefCell::new(vec![]));
    let mut task = Task::new({
        let seen = Rc::clone(&seen);
        async move {
            let faulty = Generator::new(|co| async move {
                co.delegate(Generator::new(|co| async move {
                    co.yield_(1).await;
                    if 1 + 1 == 2 {
                        panic!("inner kaboom");
                    }
                })).await;
                co.yield_(2).await;
            });
            co_for!(n in faulty => {
                seen.borrow_mut().push(*n);
            });
        }
    });

    let unwound = panic::catch_unwind(AssertUnwindSafe(|| task.wait()));
    assert_eq!(
        unwound.unwrap_err().downcast_ref::<&str>(),
        Some(&"inner kaboom"),
    );
    assert!(task.valueless());
    // the element yielded before the panic did reach the consumer
    assert_eq!(*seen.borrow(), [1]);
}

#[test]
fn advancing_an_exhausted_iterator_is_a_contract_violation ()
{
    let _ = ::env_logger::try_init();

    let mut task = Task::new(async {
        let mut iter = Generator::<u32>::new(|_co| async {}).begin().await;
        iter.advance().await;
    });
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| task.wait()));
    assert_eq!(
        unwound.unwrap_err().downcast_ref::<&str>(),
        Some(&"advanced an exhausted iterator"),
    );
}
