//! Cooperative, synchronous, recursively composable tasks.

use_prelude!();

use crate::{
    drive::{drive, Halt},
    frame::{FrameInner, FrameRef, Payload, SuspendFn, active, splice},
};

/// A suspendable computation that eventually produces one `T`.
///
/// A task is created suspended, from a plain `async` block, and makes
/// progress only while one of its blocking waiters ([`wait`][Task::wait],
/// [`wait_until`][Task::wait_until], [`wait_for`][Task::wait_for],
/// [`get`][Task::get]) or an awaiting outer task is on the call stack.
///
/// Supported suspension points inside the body:
///
///   - `other_task.await`: run `other_task` to completion as part of this
///     task's coroutine stack, then resume with its result;
///   - [`progress()`][crate::progress]`.await`: give an enclosing timed
///     wait the chance to pause the whole stack;
///   - iterating a [`Generator`][crate::Generator] (see
///     [`begin`][crate::Generator::begin] / [`co_for!`][crate::co_for]).
///
/// The handle is move-only and single-owner: dropping it, even
/// mid-suspension, destroys the frame and runs the destructors of every
/// local captured in the body (innermost frame first).
///
/// # Example
///
/// ```rust
/// use ::recoro::Task;
///
/// let mut task = Task::new(async {
///     let dividend = Task::new(async { 10 }).await;
///     let divisor = Task::new(async { 2.0_f64 }).await;
///     f64::from(dividend) / divisor
/// });
/// assert!(! task.valueless());
/// assert_eq!(*task.get(), 5.0);
/// ```
pub
struct Task<T: 'static> {
    frame: Option<FrameRef>,
    slot: Rc<CellOption<T>>,
    extracted: Option<T>,
}

impl<T: 'static> Task<T> {
    /// Wraps `body` into a task, suspended at its initial point (nothing
    /// runs until the task is waited on or awaited).
    pub
    fn new (body: impl Future<Output = T> + 'static)
      -> Self
    {
        let slot = Rc::new(CellOption::none());
        let frame = FrameInner::new({
            let slot = Rc::clone(&slot);
            async move {
                let value = body.await;
                let prev = slot.set(value);
                debug_assert!(prev.is_none(), "task produced two results");
            }
        });
        Self {
            frame: Some(frame),
            slot,
            extracted: None,
        }
    }

    /// Whether this handle no longer refers to a frame.
    ///
    /// A task only becomes valueless at runtime when a panic escapes one of
    /// the waiters (the frame is destroyed before the panic resumes); every
    /// other transfer of the frame is a Rust move, and using the donor is
    /// then a compile error rather than a runtime state.
    ///
    /// Operating on a valueless task is a contract violation: every other
    /// method panics.
    #[must_use]
    pub
    fn valueless (self: &'_ Self)
      -> bool
    {
        self.frame.is_none()
    }

    /// Runs the task to completion. No-op if it is already done.
    ///
    /// # Panics
    ///
    ///   - re-raises a panic escaping the task's body, leaving the task
    ///     [valueless][Task::valueless];
    ///
    ///   - panics if the task is valueless.
    pub
    fn wait (self: &'_ mut Self)
    {
        let frame = Rc::clone(self.frame_or_panic("wait"));
        if frame.head.is_done() {
            return;
        }
        match drive(&frame) {
            // no policy is installed, so no checkpoint can pause the stack
            | Ok(halt) => debug_assert!(matches!(halt, Halt::Done)),
            | Err(payload) => self.abandon(payload),
        }
    }

    /// Runs the task either to completion or, if the body cooperates by
    /// awaiting [`progress()`][crate::progress] checkpoints, until the
    /// monotonic clock reaches `deadline`, whichever comes first.
    ///
    /// Returns whether the task is done. `false` is a *pause*, not a
    /// cancellation: waiting again resumes exactly where the stack stopped.
    ///
    /// # Panics
    ///
    /// Same contract as [`wait`][Task::wait].
    pub
    fn wait_until (self: &'_ mut Self, deadline: Instant)
      -> bool
    {
        let frame = Rc::clone(self.frame_or_panic("wait_until"));
        if frame.head.is_done() {
            return true;
        }
        unsafe
        fn reached (ctx: *const ())
          -> bool
        {
            unsafe {
                // # Safety
                //
                //   - `ctx` points at the `deadline` local of the enclosing
                //     call, per the installation below.
                Instant::now() >= *ctx.cast::<Instant>()
            }
        }
        let policy = unsafe {
            // # Safety
            //
            //   - the policy is uninstalled before `deadline` leaves scope.
            SuspendFn::new((&raw const deadline).cast(), reached)
        };
        frame.head.install_policy(policy);
        let outcome = drive(&frame);
        frame.head.clear_policy();
        match outcome {
            | Ok(_) => frame.head.is_done(),
            | Err(payload) => self.abandon(payload),
        }
    }

    /// [`wait_until`][Task::wait_until] with `deadline = now + timeout`.
    pub
    fn wait_for (self: &'_ mut Self, timeout: Duration)
      -> bool
    {
        self.wait_until(Instant::now() + timeout)
    }

    /// Runs the task to completion (as per [`wait`][Task::wait]) and
    /// returns a reference to its result. Idempotent.
    ///
    /// # Panics
    ///
    /// Same contract as [`wait`][Task::wait].
    pub
    fn get (self: &'_ mut Self)
      -> &'_ T
    {
        self.wait();
        if self.slot.is_some() {
            self.extracted = self.slot.take();
        }
        self.extracted
            .as_ref()
            .expect("task completed without producing a result")
    }

    fn frame_or_panic (self: &'_ Self, op: &'static str)
      -> &'_ FrameRef
    {
        match self.frame {
            | Some(ref frame) => frame,
            | None => panic!("`{op}` called on a valueless task"),
        }
    }

    /// Destroys the frame *first*, so that every later operation observes a
    /// valueless task, then resumes the panic.
    fn abandon (self: &'_ mut Self, payload: Payload)
      -> !
    {
        drop(self.frame.take());
        panic::resume_unwind(payload)
    }
}

/// `task.await`: runs the callee to completion as part of the awaiting
/// coroutine's stack, then resumes the awaiter with the callee's result (or
/// its panic).
impl<T: 'static> ::std::future::IntoFuture for Task<T> {
    type Output = T;
    type IntoFuture = TaskAwait<T>;

    fn into_future (self: Self)
      -> TaskAwait<T>
    {
        TaskAwait {
            task: self,
            spliced: false,
        }
    }
}

/// Awaitable created by `task.await`; owns the awaited task until it
/// resolves.
#[must_use = "awaitables do nothing unless `.await`-ed"]
pub
struct TaskAwait<T: 'static> {
    task: Task<T>,
    spliced: bool,
}

/// No self-references: the result travels through the frame's slot, never
/// through this struct, so pinning it is never load-bearing.
impl<T: 'static> Unpin for TaskAwait<T> {}

impl<T: 'static> Future for TaskAwait<T> {
    type Output = T;

    fn poll (mut self: Pin<&'_ mut Self>, _: &'_ mut Context<'_>)
      -> Poll<T>
    {
        let this = &mut *self;
        let frame = this.task
            .frame
            .as_ref()
            .expect("awaited a valueless task");
        if !this.spliced {
            if !frame.head.is_done() {
                this.spliced = true;
                // splice the callee (and whatever sub-stack a partial
                // timed wait already built under it) above us, and
                // hand control over
                let cur = active();
                splice(&cur, frame);
                return Poll::Pending;
            }
            // already ran to completion under an earlier wait: no suspension
        } else if let Some(payload) = frame.head.take_panic() {
            // the callee unwound; continue unwinding through this frame
            panic::resume_unwind(payload);
        }
        debug_assert!(frame.head.is_done());
        Poll::Ready(
            this.task
                .slot
                .take()
                .expect("awaited task completed without producing a result"),
        )
    }
}
