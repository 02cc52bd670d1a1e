//! One *frame* per live coroutine: the pinned `async` body plus the runtime
//! metadata that strings frames together into an implicit coroutine stack.
//!
//! The stack is intrusive: there is no side table of live awaits. Each frame
//! carries
//!
//!   - `top`: on a stack's bottom frame, the frame the driver resumes next;
//!     on a generator parked between two iterator steps, the saved top of
//!     its own (possibly delegating) segment;
//!
//!   - `edge`: the link installed by the awaiter that spliced this frame
//!     under a caller; present if and only if the frame currently has a
//!     caller below it;
//!
//!   - `suspend`: the suspend policy, installed on the bottom frame for the
//!     duration of a timed wait.
//!
//! Reference discipline: links *up* or *across* the stack (`top`, `edge`)
//! are [`Weak`]; ownership flows strictly downward, from the handle the
//! driver's caller holds, through the suspended bodies, to the deepest
//! callee. Dropping a handle therefore tears down its whole sub-stack in
//! LIFO order, and no cycle can ever keep a frame alive.

use_prelude!();

/// A caught panic, in flight between the frame that raised it and the
/// awaiter that will re-raise it.
pub(in crate)
type Payload = Box<dyn Any + Send + 'static>;

/// Owning handle to a frame.
pub(in crate)
type FrameRef = Rc<FrameInner>;

/// Non-owning link to a frame on some stack.
pub(in crate)
type WeakFrame = Weak<FrameInner>;

/// A coroutine frame: head (runtime metadata) + pinned body.
pub(in crate)
struct FrameInner {
    pub(in crate)
    head: FrameHead,

    /// The suspendable computation itself. `None` once the frame has run to
    /// completion (the body is dropped eagerly at that point, so locals die
    /// as soon as the coroutine does, not when the handle goes away).
    pub(in crate)
    body: RefCell<Option<Pin<Box<dyn Future<Output = ()>>>>>,
}

impl FrameInner {
    /// Allocates the frame for `body`, suspended at its initial point.
    pub(in crate)
    fn new (body: impl Future<Output = ()> + 'static)
      -> FrameRef
    {
        let frame = Rc::new_cyclic(|this: &'_ WeakFrame| FrameInner {
            head: FrameHead::new(this.clone()),
            body: RefCell::new(Some(Box::pin(body))),
        });
        trace!("frame {:p}: created", Rc::as_ptr(&frame));
        frame
    }
}

/// The nested-edge record: present on a frame while (and only while) it is
/// the callee of an await or delegation.
pub(in crate)
struct Edge {
    /// The frame directly below, resumed when this frame pops.
    pub(in crate)
    parent: WeakFrame,

    /// The bottom of the combined stack; the single place where `top` and
    /// the routing decision live.
    pub(in crate)
    root: WeakFrame,
}

/// What the driver's trampoline should do after the frame it just polled
/// returned `Pending`. Recorded on the root by the suspension primitive
/// that caused the `Pending`; this is the stable-Rust stand-in for
/// symmetric transfer.
pub(in crate)
enum NextStep {
    /// Return control to the driver's caller.
    Return,

    /// Resume this frame next, without leaving the driver.
    Resume(FrameRef),
}

pub(in crate)
struct FrameHead {
    top: RefCell<WeakFrame>,
    edge: RefCell<Option<Edge>>,
    suspend: Cell<Option<SuspendFn>>,
    next: RefCell<NextStep>,
    panic: RefCell<Option<Payload>>,
    done: Cell<bool>,
}

impl FrameHead {
    fn new (this: WeakFrame)
      -> Self
    {
        Self {
            top: RefCell::new(this),
            edge: RefCell::new(None),
            suspend: Cell::new(None),
            next: RefCell::new(NextStep::Return),
            panic: RefCell::new(None),
            done: Cell::new(false),
        }
    }

    pub(in crate)
    fn is_done (self: &'_ Self)
      -> bool
    {
        self.done.get()
    }

    pub(in crate)
    fn finish (self: &'_ Self)
    {
        self.done.set(true);
    }

    pub(in crate)
    fn set_top (self: &'_ Self, top: WeakFrame)
    {
        *self.top.borrow_mut() = top;
    }

    pub(in crate)
    fn replace_top (self: &'_ Self, top: WeakFrame)
      -> WeakFrame
    {
        self.top.replace(top)
    }

    pub(in crate)
    fn is_nested (self: &'_ Self)
      -> bool
    {
        self.edge.borrow().is_some()
    }

    pub(in crate)
    fn install_edge (self: &'_ Self, edge: Edge)
    {
        let prev = self.edge.borrow_mut().replace(edge);
        debug_assert!(prev.is_none(), "frame spliced while already on a stack");
    }

    pub(in crate)
    fn take_edge (self: &'_ Self)
      -> Option<Edge>
    {
        self.edge.borrow_mut().take()
    }

    /// Refreshes the root link of an already-installed edge; yields the
    /// parent link so a re-rooting walk can continue downward.
    fn retarget_root (self: &'_ Self, root: WeakFrame)
      -> WeakFrame
    {
        let mut edge = self.edge.borrow_mut();
        let edge = edge
            .as_mut()
            .expect("saved stack segment contains a frame without an edge");
        edge.root = root;
        edge.parent.clone()
    }

    fn edge_rooted_at (self: &'_ Self, root: &'_ FrameRef)
      -> bool
    {
        self.edge.borrow()
            .as_ref()
            .and_then(|edge| edge.root.upgrade())
            .is_some_and(|r| Rc::ptr_eq(&r, root))
    }

    pub(in crate)
    fn install_policy (self: &'_ Self, policy: SuspendFn)
    {
        self.suspend.set(Some(policy));
    }

    pub(in crate)
    fn clear_policy (self: &'_ Self)
    {
        self.suspend.set(None);
    }

    /// Queries the suspend policy. No policy means "never suspend"; only
    /// ever meaningful on the bottom frame of a stack.
    pub(in crate)
    fn must_suspend (self: &'_ Self)
      -> bool
    {
        self.suspend.get().is_some_and(|policy| policy.query())
    }

    pub(in crate)
    fn set_next (self: &'_ Self, next: NextStep)
    {
        *self.next.borrow_mut() = next;
    }

    pub(in crate)
    fn take_next (self: &'_ Self)
      -> NextStep
    {
        self.next.replace(NextStep::Return)
    }

    pub(in crate)
    fn set_panic (self: &'_ Self, payload: Payload)
    {
        let prev = self.panic.borrow_mut().replace(payload);
        debug_assert!(prev.is_none(), "frame panicked twice");
    }

    pub(in crate)
    fn take_panic (self: &'_ Self)
      -> Option<Payload>
    {
        self.panic.borrow_mut().take()
    }
}

/// The suspend policy: two words: an opaque context pointer and the
/// predicate reading it. Installed on the bottom frame of a stack for the
/// duration of a timed wait, and consulted at every [`progress()`]
/// checkpoint of that stack.
#[derive(Clone, Copy)]
pub(in crate)
struct SuspendFn {
    ctx: *const (),
    fptr: unsafe fn(*const ()) -> bool,
}

impl SuspendFn {
    /// # Safety
    ///
    ///   - `ctx` must stay valid for reads, and `fptr` sound to call on it,
    ///     for as long as the policy stays installed. The installing
    ///     `wait_until` frame on the real call stack fulfills this: the
    ///     policy is cleared before its locals go out of scope.
    pub(in crate)
    unsafe
    fn new (ctx: *const (), fptr: unsafe fn(*const ()) -> bool)
      -> Self
    {
        Self { ctx, fptr }
    }

    fn query (self: &'_ Self)
      -> bool
    {
        unsafe {
            // # Safety
            //
            //   - guaranteed by the contract of `Self::new`.
            (self.fptr)(self.ctx)
        }
    }
}

::std::thread_local! {
    /// The frame currently being polled by a driver on this thread; how the
    /// suspension primitives learn which frame they execute in.
    static ACTIVE: RefCell<Option<FrameRef>> = RefCell::new(None);
}

/// Runs `f` with `frame` as the active frame, restoring the previous one
/// even if `f` unwinds (a nested driver on a *different* root, or a panic
/// crossing the frame on its way out, must not corrupt the slot).
pub(in crate)
fn with_active<R> (frame: &'_ FrameRef, f: impl FnOnce() -> R)
  -> R
{
    let prev = ACTIVE.with(|slot| slot.replace(Some(Rc::clone(frame))));
    ::unwind_safe::with_state(prev)
        .try_eval(move |_| f())
        .finally(move |prev| ACTIVE.with(|slot| drop(slot.replace(prev))))
}

/// The frame the running suspension primitive belongs to.
///
/// Panicking here means one of this crate's awaitables was polled outside a
/// driven coroutine (*e.g.*, on a foreign executor): a contract violation.
pub(in crate)
fn active ()
  -> FrameRef
{
    ACTIVE
        .with(|slot| slot.borrow().clone())
        .expect("recoro awaitable polled outside of a driven coroutine frame")
}

/// The bottom frame of the stack `frame` is currently on (itself, if it is
/// not nested).
pub(in crate)
fn root_of (frame: &'_ FrameRef)
  -> FrameRef
{
    let edge = frame.head.edge.borrow();
    match *edge {
        | Some(ref edge) => edge.root
            .upgrade()
            .expect("root frame dropped while its stack was live"),
        | None => Rc::clone(frame),
    }
}

/// The top of the (possibly saved) stack segment rooted at `frame`: where
/// resumption must start so that re-entering a partially run computation is
/// `O(1)`. A frame that never awaited anything is its own top.
pub(in crate)
fn segment_top (frame: &'_ FrameRef)
  -> FrameRef
{
    frame.head.top.borrow()
        .upgrade()
        .expect("suspended stack segment dropped while still linked")
}

/// Splices `callee` (and its saved segment, if it already ran partially)
/// onto the stack of `cur`, directly above `cur`, and records the routing
/// decision for the trampoline: transfer into the segment top, unless the
/// root's policy says the whole stack must pause first.
///
/// This is the single write point for the push side of the stack; the pop
/// side lives in the driver.
pub(in crate)
fn splice (cur: &'_ FrameRef, callee: &'_ FrameRef)
{
    let root = root_of(cur);
    callee.head.install_edge(Edge {
        parent: Rc::downgrade(cur),
        root: Rc::downgrade(&root),
    });
    let top = segment_top(callee);
    reroot(&top, callee, &root);
    root.head.set_top(Rc::downgrade(&top));
    trace!(
        "frame {:p}: spliced under {:p} (top {:p})",
        Rc::as_ptr(callee), Rc::as_ptr(cur), Rc::as_ptr(&top),
    );
    root.head.set_next(
        if root.head.must_suspend() {
            NextStep::Return
        } else {
            NextStep::Resume(top)
        },
    );
}

/// A saved segment still carries the root it last ran under. Refresh every
/// edge from the segment top down to (excluding) `callee` so progress
/// checks and routing consult the stack the segment now belongs to.
fn reroot (top: &'_ FrameRef, callee: &'_ FrameRef, root: &'_ FrameRef)
{
    if Rc::ptr_eq(top, callee) {
        return; // fresh frame, nothing saved
    }
    if top.head.edge_rooted_at(root) {
        return; // segment already rooted here (the common re-splice)
    }
    let link = Rc::downgrade(root);
    let mut frame = Rc::clone(top);
    while !Rc::ptr_eq(&frame, callee) {
        let parent = frame.head.retarget_root(link.clone());
        frame = parent
            .upgrade()
            .expect("saved stack segment with a broken parent chain");
    }
}

/// Returns the *progress checkpoint* awaitable.
///
/// `progress().await` is a no-op unless an enclosing timed wait
/// ([`crate::Task::wait_until`] / [`crate::Task::wait_for`]) has run past
/// its deadline, in which case the whole coroutine stack pauses and the
/// timed wait returns `false`. A later wait resumes right at the
/// checkpoint.
///
/// This is the **only** suspension point that consults the deadline for its
/// own sake; a computation without checkpoints runs each resume to the next
/// yield/await boundary regardless of any deadline; cooperation is
/// explicit.
///
/// # Example
///
/// ```rust
/// use ::recoro::{progress, Task};
///
/// let mut task = Task::new(async {
///     for chunk in 0_u32 .. 3 {
///         progress().await;
///         // ... one bounded chunk of work ...
///         let _ = chunk;
///     }
///     42
/// });
/// // Deadline already expired: pauses at the first checkpoint.
/// assert!(! task.wait_for(::std::time::Duration::ZERO));
/// task.wait();
/// assert_eq!(*task.get(), 42);
/// ```
pub
fn progress ()
  -> Progress
{
    Progress { reached: false }
}

/// Awaitable returned by [`progress()`].
#[must_use = "awaitables do nothing unless `.await`-ed"]
pub
struct Progress {
    reached: bool,
}

impl Future for Progress {
    type Output = ();

    fn poll (mut self: Pin<&'_ mut Self>, _: &'_ mut Context<'_>)
      -> Poll<()>
    {
        if self.reached {
            return Poll::Ready(()); // resumed past the checkpoint
        }
        let frame = active();
        let root = root_of(&frame);
        if root.head.must_suspend() {
            self.reached = true;
            // `top` is untouched: the next resume restarts right here.
            root.head.set_next(NextStep::Return);
            debug!("frame {:p}: pausing at checkpoint", Rc::as_ptr(&frame));
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}
