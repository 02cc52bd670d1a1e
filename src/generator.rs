//! Lazy, single-pass generators, consumable from inside a task and
//! recursively composable through delegation.
//!
//! The stack surgery here differs from a task await in one way: a generator
//! does not stay on the consumer's stack between elements. Each iterator
//! step splices the generator's *saved segment* (the generator plus any
//! delegatees it had live) above the consuming frame, resumes it until the
//! next yield or completion, then unsplices the segment again, saving its
//! live top so the next step can resume in `O(1)`.
//!
//! Delegation inherits two things from the outer generator: the *sink* (the
//! slot the consuming iterator reads, so the deepest `yield_` writes to the
//! consumer directly, skipping every intermediate level) and the *yield
//! target* (the consuming frame control transfers to on every yield). Both
//! make a yield `O(1)` at any delegation depth.

use_prelude!();

use crate::frame::{FrameInner, FrameRef, NextStep, WeakFrame, active, root_of, splice};

/// A suspendable computation lazily yielding a sequence of `Y`s.
///
/// Created from a closure receiving the [`Co`] yield capability; nothing
/// runs until the generator is iterated. Iteration happens from inside a
/// [`Task`][crate::Task] (or another generator), because advancing the
/// iterator is itself an awaitable operation: see [`begin`][Generator::begin]
/// and [`co_for!`][crate::co_for].
///
/// A generator is single-pass and single-consumer: `begin` consumes the
/// handle, the iterator owns the frame, and neither can be cloned.
///
/// # Example
///
/// ```rust
/// use ::recoro::prelude::*;
///
/// fn countdown (mut remaining: u32)
///   -> Generator<u32>
/// {
///     Generator::new(move |co| async move {
///         while let Some(next) = remaining.checked_sub(1) {
///             co.yield_(remaining).await;
///             remaining = next;
///         }
///     })
/// }
///
/// let mut task = Task::new(async {
///     let mut collected = vec![];
///     co_for!(n in countdown(3) => {
///         collected.push(*n);
///     });
///     collected
/// });
/// assert_eq!(*task.get(), [3, 2, 1]);
/// ```
pub
struct Generator<Y: 'static> {
    frame: FrameRef,
    shared: Rc<GenShared<Y>>,
}

impl<Y: 'static> Generator<Y> {
    /// Wraps `body` into a generator, suspended at its initial point.
    ///
    /// Inside the body, the [`Co`] handle is the only way to emit elements:
    /// `co.yield_(value).await`, `co.delegate(other).await`,
    /// `co.yield_iter(iterable).await`. The body may also await tasks and
    /// [`progress()`][crate::progress] checkpoints.
    pub
    fn new<F, Fut> (body: F)
      -> Self
    where
        F : FnOnce(Co<Y>) -> Fut,
        Fut : Future<Output = ()> + 'static,
    {
        let shared = Rc::new(GenShared::new());
        let co = Co { shared: Rc::clone(&shared) };
        Self {
            frame: FrameInner::new(body(co)),
            shared,
        }
    }

    /// Returns the awaitable producing this generator's iterator: it runs
    /// the generator up to its first yield (or completion) as part of the
    /// awaiting task's stack, and resolves to a [`GenIter`] that owns the
    /// generator from then on.
    pub
    fn begin (self: Self)
      -> Begin<Y>
    {
        Begin {
            generator: Some(self),
            spliced: false,
        }
    }
}

/// The state shared between a generator's frame, its [`Co`] handle, and its
/// iterator: the yielded-element slot plus the two links inherited on
/// delegation.
struct GenShared<Y> {
    /// The element most recently yielded *to this generator's consumer*,
    /// alive from a yield until the next iterator step.
    value: RefCell<Option<Y>>,

    /// Where `yield_` actually writes: the shared state of the outermost
    /// generator of the delegation chain (`None` = this one), *i.e.*, the
    /// slot the consuming iterator reads.
    out: RefCell<Option<Rc<GenShared<Y>>>>,

    /// The consuming frame every yield transfers control to. Bound on the
    /// first iterator step; a once-started generator cannot migrate to a
    /// different consumer.
    target: RefCell<Option<WeakFrame>>,
}

impl<Y> GenShared<Y> {
    fn new ()
      -> Self
    {
        Self {
            value: RefCell::new(None),
            out: RefCell::new(None),
            target: RefCell::new(None),
        }
    }

    fn sink (this: &'_ Rc<Self>)
      -> Rc<Self>
    {
        this.out.borrow()
            .as_ref()
            .map_or_else(|| Rc::clone(this), Rc::clone)
    }

    fn bind_target (self: &'_ Self, consumer: &'_ FrameRef)
    {
        let mut target = self.target.borrow_mut();
        match *target {
            | Some(ref bound) => assert!(
                bound.ptr_eq(&Rc::downgrade(consumer)),
                "a started generator cannot migrate to a different consuming task",
            ),
            | None => *target = Some(Rc::downgrade(consumer)),
        }
    }

    /// Wires `inner` up as a delegatee of `this`: same sink, same yield
    /// target.
    fn delegate_to (this: &'_ Rc<Self>, inner: &'_ GenShared<Y>)
    {
        let prev = inner.out.borrow_mut().replace(Self::sink(this));
        debug_assert!(prev.is_none(), "generator delegated to twice");
        let mut target = inner.target.borrow_mut();
        debug_assert!(
            target.is_none(),
            "delegated to a generator that is already being iterated",
        );
        *target = this.target.borrow().clone();
    }
}

/// The yield capability of one [`Generator`], passed by value into its
/// body.
pub
struct Co<Y: 'static> {
    shared: Rc<GenShared<Y>>,
}

impl<Y: 'static> Co<Y> {
    /// Returns the awaitable yielding one element: parks this generator,
    /// hands `value` and control to the consumer, and resumes when the
    /// consumer asks for the next element.
    pub
    fn yield_ (self: &'_ Self, value: Y)
      -> Yield<Y>
    {
        Yield {
            shared: Rc::clone(&self.shared),
            value: Some(value),
            parked: false,
        }
    }

    /// Returns the awaitable yielding every element of `other` as if this
    /// generator produced it, then resuming this generator.
    ///
    /// Elements of `other` (and of its own delegatees, recursively) reach
    /// the consumer directly; the delegation chain is never re-walked.
    /// Delegating an already-exhausted generator yields nothing.
    pub
    fn delegate (self: &'_ Self, other: Generator<Y>)
      -> Delegate<Y>
    {
        Delegate {
            shared: Rc::clone(&self.shared),
            other,
            spliced: false,
        }
    }

    /// Returns the awaitable yielding every element of a plain (non-lazy)
    /// iterable: wraps it in an ad-hoc generator looping over it, then
    /// delegates to that.
    pub
    fn yield_iter<I> (self: &'_ Self, items: I)
      -> Delegate<Y>
    where
        I : IntoIterator<Item = Y> + 'static,
    {
        self.delegate(Generator::new(move |co| async move {
            for item in items {
                co.yield_(item).await;
            }
        }))
    }
}

/// Awaitable returned by [`Co::yield_`].
#[must_use = "awaitables do nothing unless `.await`-ed"]
pub
struct Yield<Y: 'static> {
    shared: Rc<GenShared<Y>>,
    value: Option<Y>,
    parked: bool,
}

/// No self-references: the element travels through the generator's shared
/// slot, so pinning this struct is never load-bearing.
impl<Y: 'static> Unpin for Yield<Y> {}

impl<Y: 'static> Future for Yield<Y> {
    type Output = ();

    fn poll (mut self: Pin<&'_ mut Self>, _: &'_ mut Context<'_>)
      -> Poll<()>
    {
        let this = &mut *self;
        if this.parked {
            return Poll::Ready(()); // the consumer asked for the next one
        }
        this.parked = true;
        let frame = active();
        let value = this.value.take().expect("yield polled twice before parking");
        let prev = GenShared::sink(&this.shared).value.borrow_mut().replace(value);
        debug_assert!(prev.is_none(), "yielded over an unconsumed element");
        let consumer = this.shared
            .target
            .borrow()
            .as_ref()
            .and_then(WeakFrame::upgrade)
            .expect("generator yielded while not being iterated");
        // control skips every delegation level and goes straight to the
        // consumer; `top` still points at this frame, and the consumer's
        // iterator step saves it when it picks the element up
        root_of(&frame).head.set_next(NextStep::Resume(consumer));
        Poll::Pending
    }
}

/// Awaitable returned by [`Co::delegate`] and [`Co::yield_iter`]; owns the
/// delegatee until it is exhausted.
#[must_use = "awaitables do nothing unless `.await`-ed"]
pub
struct Delegate<Y: 'static> {
    shared: Rc<GenShared<Y>>,
    other: Generator<Y>,
    spliced: bool,
}

impl<Y: 'static> Future for Delegate<Y> {
    type Output = ();

    fn poll (mut self: Pin<&'_ mut Self>, _: &'_ mut Context<'_>)
      -> Poll<()>
    {
        let this = &mut *self;
        if !this.spliced {
            if !this.other.frame.head.is_done() {
                this.spliced = true;
                GenShared::delegate_to(&this.shared, &this.other.shared);
                let cur = active();
                splice(&cur, &this.other.frame);
                return Poll::Pending;
            }
            // exhausted delegatee: nothing to yield, keep going
        } else if let Some(payload) = this.other.frame.head.take_panic() {
            // the delegatee unwound; continue unwinding through this
            // generator, towards the consumer's iterator step
            panic::resume_unwind(payload);
        }
        Poll::Ready(())
    }
}

/// Awaitable returned by [`Generator::begin`]; resolves to the generator's
/// [`GenIter`], positioned on the first element (or already at the end).
#[must_use = "awaitables do nothing unless `.await`-ed"]
pub
struct Begin<Y: 'static> {
    generator: Option<Generator<Y>>,
    spliced: bool,
}

impl<Y: 'static> Future for Begin<Y> {
    type Output = GenIter<Y>;

    fn poll (mut self: Pin<&'_ mut Self>, _: &'_ mut Context<'_>)
      -> Poll<GenIter<Y>>
    {
        let this = &mut *self;
        let generator = this.generator
            .as_ref()
            .expect("begin polled after resolving");
        if !this.spliced {
            this.spliced = true;
            let cur = active();
            generator.shared.bind_target(&cur);
            splice(&cur, &generator.frame);
            return Poll::Pending;
        }
        finish_step(&generator.frame);
        let Generator { frame, shared } = this.generator
            .take()
            .expect("begin polled after resolving");
        Poll::Ready(GenIter { frame, shared })
    }
}

/// Move-only iterator over one generator's elements; owns the generator's
/// frame (dropping the iterator mid-sequence destroys the whole delegation
/// chain, innermost frame first).
///
/// The iteration protocol, usable from inside a task body only (sugared by
/// [`co_for!`][crate::co_for]):
///
/// ```rust
/// # use ::recoro::prelude::*;
/// # let mut task = Task::new(async {
/// # let generator = Generator::new(|co| async move { co.yield_(1_u32).await; });
/// # let mut total = 0;
/// let mut iter = generator.begin().await;
/// while !iter.is_done() {
///     total += *iter.get();
///     iter.advance().await;
/// }
/// # total });
/// # assert_eq!(*task.get(), 1);
/// ```
pub
struct GenIter<Y: 'static> {
    frame: FrameRef,
    shared: Rc<GenShared<Y>>,
}

impl<Y: 'static> GenIter<Y> {
    /// Whether the generator has run to completion: the "`== end`" of the
    /// iteration protocol. A done iterator holds no element and must not be
    /// advanced.
    #[must_use]
    pub
    fn is_done (self: &'_ Self)
      -> bool
    {
        self.frame.head.is_done()
    }

    /// The element the iterator is currently positioned on.
    ///
    /// # Panics
    ///
    /// Panics if no element is available (`is_done` iterator): a contract
    /// violation.
    #[must_use]
    pub
    fn get (self: &'_ Self)
      -> Ref<'_, Y>
    {
        Ref::map(
            self.shared.value.borrow(),
            |slot| slot.as_ref().expect("no element is available"),
        )
    }

    /// Returns the awaitable advancing the iterator: resumes the generator
    /// until its next yield or its completion; resolves to whether a new
    /// element is available.
    ///
    /// # Panics
    ///
    /// Polling the awaitable panics if the iterator [`is_done`][Self::is_done]:
    /// a contract violation.
    pub
    fn advance (self: &'_ mut Self)
      -> Advance<'_, Y>
    {
        Advance {
            iter: self,
            spliced: false,
        }
    }
}

/// Awaitable returned by [`GenIter::advance`].
#[must_use = "awaitables do nothing unless `.await`-ed"]
pub
struct Advance<'iter, Y: 'static> {
    iter: &'iter mut GenIter<Y>,
    spliced: bool,
}

impl<Y: 'static> Future for Advance<'_, Y> {
    type Output = bool;

    fn poll (mut self: Pin<&'_ mut Self>, _: &'_ mut Context<'_>)
      -> Poll<bool>
    {
        let this = &mut *self;
        if !this.spliced {
            assert!(
                !this.iter.frame.head.is_done(),
                "advanced an exhausted iterator",
            );
            this.spliced = true;
            let cur = active();
            this.iter.shared.bind_target(&cur);
            // the element we iterated past dies here
            drop(this.iter.shared.value.borrow_mut().take());
            splice(&cur, &this.iter.frame);
            return Poll::Pending;
        }
        finish_step(&this.iter.frame);
        Poll::Ready(!this.iter.frame.head.is_done())
    }
}

/// Resume action of one iterator step (begin or advance), running inside
/// the consumer, right after the generator yielded, completed, or
/// panicked.
fn finish_step (generator: &'_ FrameRef)
{
    if let Some(payload) = generator.head.take_panic() {
        // the driver popped us back because the generator unwound; keep
        // unwinding through the consumer
        panic::resume_unwind(payload);
    }
    if generator.head.is_done() {
        // popped by the driver at completion: already off the stack
        return;
    }
    // resumed by a yield: the segment is still spliced on top of us. Save
    // its live top (which may be a delegatee arbitrarily deep) for the next
    // step, put the consumer back on top, and unlink the edge.
    let consumer = active();
    let root = root_of(&consumer);
    let segment = root.head.replace_top(Rc::downgrade(&consumer));
    generator.head.set_top(segment);
    drop(generator.head.take_edge());
    trace!(
        "frame {:p}: generator parked, consumer {:p} back on top",
        Rc::as_ptr(generator), Rc::as_ptr(&consumer),
    );
}
