//! Synchronous, single-threaded, **cooperative** coroutines for `stable`
//! Rust: suspendable [`Task`]s producing one value, and lazy [`Generator`]s
//! producing a sequence, both **recursively composable** (a task may await
//! another task, a generator may delegate to another generator) without any
//! heap-allocated continuation chain.
//!
//! Nested coroutines are spliced onto an implicit, intrusively linked
//! coroutine stack rooted at the frame whose driver ([`Task::wait`] *&co.*)
//! is on the real call stack. Resuming a deeply nested computation, or
//! receiving a value yielded at any delegation depth, is `O(1)`.
//!
//! Coroutine bodies are plain `async` blocks, driven with a no-op waker;
//! `.await` is the suspension syntax:
//!
//!   - `task.await` awaits a nested [`Task`],
//!   - [`progress()`]`.await` offers a timed driver the chance to pause,
//!   - `co.yield_(value).await` yields from a [`Generator`] body,
//!   - `co.delegate(other).await` yields every element of another generator.
//!
//! # Example
//!
//! ```rust
//! use ::recoro::prelude::*;
//!
//! fn evens_then_odds (up_to: u32)
//!   -> Generator<u32>
//! {
//!     Generator::new(move |co| async move {
//!         co.yield_iter((0 .. up_to).filter(|n| n % 2 == 0)).await;
//!         co.yield_iter((0 .. up_to).filter(|n| n % 2 == 1)).await;
//!     })
//! }
//!
//! let mut task = Task::new(async {
//!     let doubled = Task::new(async { 21 * 2 }).await;
//!     let mut collected = vec![doubled];
//!     co_for!(n in evens_then_odds(4) => {
//!         collected.push(*n);
//!     });
//!     collected
//! });
//! assert_eq!(*task.get(), [42, 0, 2, 1, 3]);
//! ```
//!
//! # Cooperation is explicit
//!
//! There is no preemption and no I/O integration: a computation only runs
//! while one of the blocking waiters is on the call stack, and a timed wait
//! ([`Task::wait_until`] / [`Task::wait_for`]) can only pause a computation
//! at an explicit [`progress()`] checkpoint.
//!
//! # Panics
//!
//! A panic inside a coroutine body unwinds across the nested frames in
//! order, running destructors frame by frame, and resurfaces from the
//! outermost `wait`/`get` call, which leaves the task *valueless*
//! (see [`Task::valueless`]).

#![warn(
    future_incompatible,
    rust_2018_compatibility,
    missing_docs,
    clippy::cargo,
    clippy::pedantic,
)]
#![deny(
    unused_must_use,
)]
#![doc(test(attr(deny(warnings))))]

#[macro_use]
mod utils;

mod drive;

pub use self::frame::{progress, Progress};
mod frame;

pub use self::generator::{Advance, Begin, Co, Delegate, GenIter, Generator, Yield};
mod generator;

pub use self::task::{Task, TaskAwait};
mod task;

mod public_macros;

#[path = "public_prelude.rs"]
pub
mod prelude;

#[cfg(test)]
mod tests;
