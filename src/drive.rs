//! The driver: the outer, non-coroutine loop that resumes the top of an
//! implicit coroutine stack until the root completes or the stack pauses.
//!
//! Every resumption is one `poll` of one frame's body with a no-op waker.
//! A frame that suspends has already recorded, on the root, which frame to
//! resume next (or that control must return to the driver's caller); a
//! frame that completes pops to its parent here. Either way the next frame
//! is resumed directly, never by re-polling through the chain, which is
//! what keeps resumption `O(1)` at any nesting depth.

use_prelude!();

use crate::frame::{FrameRef, NextStep, Payload, segment_top, with_active};

/// Why the trampoline stopped.
pub(in crate)
enum Halt {
    /// The root frame ran to completion.
    Done,

    /// The suspend policy paused the stack at a progress checkpoint (or at
    /// a splice). `top` points at the frame to resume next time.
    Suspended,
}

/// Resumes `root`'s stack, starting at its current top, until the root
/// completes, the stack pauses, or a panic escapes the root.
///
/// On `Err`, every frame of the stack has already been unwound and dropped;
/// the caller owns marking its handle valueless and re-raising.
pub(in crate)
fn drive (root: &'_ FrameRef)
  -> Result<Halt, Payload>
{
    debug_assert!(!root.head.is_nested(), "drove a frame that has a caller");
    let mut cur = segment_top(root);
    loop {
        // stale routing (or a poisoned one from a panicking awaiter) must
        // not leak into this resumption
        root.head.set_next(NextStep::Return);
        match step(&cur) {
            | Ok(Poll::Ready(())) => {
                finish(&cur);
                match cur.head.take_edge() {
                    | Some(edge) => {
                        let parent = edge.parent
                            .upgrade()
                            .expect("parent frame dropped while awaiting");
                        trace!(
                            "frame {:p}: done, popping to {:p}",
                            Rc::as_ptr(&cur), Rc::as_ptr(&parent),
                        );
                        root.head.set_top(edge.parent);
                        // popping is bookkeeping, not a yield: transfer to
                        // the parent even when the deadline has passed
                        cur = parent;
                    },
                    | None => {
                        debug!("frame {:p}: root complete", Rc::as_ptr(&cur));
                        return Ok(Halt::Done);
                    },
                }
            },
            | Ok(Poll::Pending) => match root.head.take_next() {
                | NextStep::Resume(next) => cur = next,
                | NextStep::Return => return Ok(Halt::Suspended),
            },
            | Err(payload) => {
                finish(&cur);
                match cur.head.take_edge() {
                    | Some(edge) => {
                        let parent = edge.parent
                            .upgrade()
                            .expect("parent frame dropped while awaiting");
                        trace!(
                            "frame {:p}: panicked, unwinding into {:p}",
                            Rc::as_ptr(&cur), Rc::as_ptr(&parent),
                        );
                        // parked for the parent's awaiter, which re-raises
                        // it inside the parent's body
                        cur.head.set_panic(payload);
                        root.head.set_top(edge.parent);
                        cur = parent;
                    },
                    | None => return Err(payload),
                }
            },
        }
    }
}

/// One resumption of one frame, with the active-frame slot pointing at it
/// and any panic caught for manual unwinding across the stack.
fn step (frame: &'_ FrameRef)
  -> Result<Poll<()>, Payload>
{
    trace!("frame {:p}: resume", Rc::as_ptr(frame));
    panic::catch_unwind(panic::AssertUnwindSafe(|| {
        with_active(frame, || {
            let mut body = frame.body
                .try_borrow_mut()
                .expect("frame resumed re-entrantly");
            body.as_mut()
                .expect("resumed a finished frame")
                .as_mut()
                .poll(&mut Context::from_waker(Waker::noop()))
        })
    }))
}

/// Marks the frame done and drops its body in place, so coroutine locals
/// die at completion rather than when the owning handle does.
fn finish (frame: &'_ FrameRef)
{
    frame.head.finish();
    drop(frame.body.borrow_mut().take());
}
