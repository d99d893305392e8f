//! Activation records of suspended generator bodies
//!
//! A frame holds a body future together with the bookkeeping every generator
//! shares regardless of its failure type: the root's pointer to the innermost
//! active frame, the address of the last produced element, and the link to
//! the awaiter that entered it as a nested child.
//!
//! Frames are polled with a crate-private waker whose data pointer is the
//! frame's [`Base`]. Yield futures locate the frame that is polling them
//! through that waker.

use crate::co::Completion;
use crate::nest::Nest;
use std::cell::{Cell, UnsafeCell};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use tracing::{debug, trace};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity for a new frame
pub(crate) fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Type-erased pointer to a frame with element type `Y`
pub(crate) type ResumePtr<'a, Y> = NonNull<dyn Resume<'a, Y> + 'a>;

/// Element exposed by the most recent yield
pub(crate) enum Produced<Y> {
    Nothing,
    Shared(NonNull<Y>),
    Exclusive(NonNull<Y>),
    Owned(NonNull<Option<Y>>),
}

impl<Y> Clone for Produced<Y> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Y> Copy for Produced<Y> {}

/// State shared by all frames with element type `Y`
///
/// `serial` must stay the first field: yield futures read it through the
/// waker's data pointer before they know the frame's element type matches.
#[repr(C)]
pub(crate) struct Base<'a, Y> {
    serial: u64,
    this: ResumePtr<'a, Y>,
    top: Cell<ResumePtr<'a, Y>>,
    produced: Cell<Produced<Y>>,
    finished: Cell<bool>,
}

impl<'a, Y> Base<'a, Y> {
    fn new(serial: u64, this: ResumePtr<'a, Y>) -> Self {
        Self {
            serial,
            this,
            top: Cell::new(this),
            produced: Cell::new(Produced::Nothing),
            finished: Cell::new(false),
        }
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// This frame, type-erased
    pub(crate) fn this(&self) -> ResumePtr<'a, Y> {
        self.this
    }

    /// Innermost active frame of the chain rooted here
    pub(crate) fn top(&self) -> ResumePtr<'a, Y> {
        self.top.get()
    }

    pub(crate) fn set_top(&self, top: ResumePtr<'a, Y>) {
        self.top.set(top)
    }

    pub(crate) fn produce(&self, produced: Produced<Y>) {
        self.produced.set(produced)
    }

    pub(crate) fn produced(&self) -> Produced<Y> {
        self.produced.get()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// Element exposed by the innermost frame of the chain rooted here
    ///
    /// # Safety
    ///
    /// `self` must be the base of a live root frame.
    pub(crate) unsafe fn element(&self) -> Produced<Y> {
        self.top().as_ref().base().produced()
    }
}

/// Outcome of polling a frame once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// The body yielded, or entered a nested generator
    Suspended,
    /// A nested body finished and control went back to its parent
    Returned,
    /// A top-level body finished
    Finished,
}

/// Operations on a frame that do not depend on its failure type
pub(crate) trait Resume<'a, Y> {
    fn base(&self) -> &Base<'a, Y>;

    /// Base of the root of the chain this frame belongs to
    fn root(&self) -> NonNull<Base<'a, Y>>;

    /// Move this frame's link under a new root, returning its parent
    fn reroot(&self, root: NonNull<Base<'a, Y>>) -> Option<ResumePtr<'a, Y>>;

    /// Poll the body once
    ///
    /// # Safety
    ///
    /// The frame must be live, not finished, and not already being polled.
    unsafe fn resume(&self) -> Step;
}

/// Operations on a frame whose failure type is `E`
pub(crate) trait Activation<'a, Y, E>: Resume<'a, Y> {
    /// Record that this frame runs as a nested child
    fn attach(&self, nest: NonNull<Nest<'a, Y, E>>);

    /// Failure of a top-level body, once
    fn take_failure(&self) -> Option<E>;
}

/// A generator body placed in its backing block
///
/// `body` is declared first so it is dropped while `base` is still intact:
/// nested awaiters dropped with it restore the root's `top`.
pub(crate) struct Frame<'a, Y, E, F> {
    body: UnsafeCell<F>,
    base: Base<'a, Y>,
    link: Cell<Option<NonNull<Nest<'a, Y, E>>>>,
    failure: Cell<Option<E>>,
}

impl<'a, Y, E, F> Frame<'a, Y, E, F> {
    pub(crate) fn new(serial: u64, this: ResumePtr<'a, Y>, body: F) -> Self {
        Self {
            body: UnsafeCell::new(body),
            base: Base::new(serial, this),
            link: Cell::new(None),
            failure: Cell::new(None),
        }
    }

    fn complete(&self, outcome: Result<(), E>) -> Step {
        match self.link.take() {
            Some(nest) => {
                let nest = unsafe { nest.as_ref() };
                if let Err(failure) = outcome {
                    nest.fail(failure);
                }
                let parent = nest.parent();
                unsafe { nest.root().as_ref() }.set_top(parent);
                trace!(serial = self.base.serial, "Nested generator returned to its parent");
                Step::Returned
            }
            None => {
                if let Err(failure) = outcome {
                    self.failure.set(Some(failure));
                }
                Step::Finished
            }
        }
    }
}

impl<'a, Y, E, F> Resume<'a, Y> for Frame<'a, Y, E, F>
where
    F: Future,
    F::Output: Completion<E>,
{
    fn base(&self) -> &Base<'a, Y> {
        &self.base
    }

    fn root(&self) -> NonNull<Base<'a, Y>> {
        match self.link.get() {
            Some(nest) => unsafe { nest.as_ref() }.root(),
            None => NonNull::from(&self.base),
        }
    }

    fn reroot(&self, root: NonNull<Base<'a, Y>>) -> Option<ResumePtr<'a, Y>> {
        self.link.get().map(|nest| {
            let nest = unsafe { nest.as_ref() };
            nest.set_root(root);
            nest.parent()
        })
    }

    unsafe fn resume(&self) -> Step {
        debug_assert!(!self.base.is_finished());
        self.base.produce(Produced::Nothing);

        let waker = driver_waker(&self.base);
        let mut cx = Context::from_waker(&waker);
        let body = Pin::new_unchecked(&mut *self.body.get());

        let unwinding = Unwinding(&self.base.finished);
        let poll = body.poll(&mut cx);
        mem::forget(unwinding);

        match poll {
            Poll::Pending => Step::Suspended,
            Poll::Ready(output) => {
                self.base.finished.set(true);
                self.complete(output.into_outcome())
            }
        }
    }
}

impl<'a, Y, E, F> Activation<'a, Y, E> for Frame<'a, Y, E, F>
where
    F: Future,
    F::Output: Completion<E>,
{
    fn attach(&self, nest: NonNull<Nest<'a, Y, E>>) {
        self.link.set(Some(nest));
    }

    fn take_failure(&self) -> Option<E> {
        self.failure.take()
    }
}

/// Marks a frame finished if its body panics while polled
struct Unwinding<'f>(&'f Cell<bool>);

impl Drop for Unwinding<'_> {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

/// Resume the chain rooted at `root` until an element is produced or the root finishes
///
/// Each call resumes the innermost active frame directly. A nested frame that
/// finishes hands control back to its parent, which is resumed in the same
/// call; a body that enters a nested generator hands control to the child.
///
/// # Safety
///
/// `root` must be a live top-level frame that is not finished.
pub(crate) unsafe fn drive<'a, Y, E>(root: &(dyn Activation<'a, Y, E> + 'a)) -> Result<(), E> {
    let base = root.base();
    loop {
        let top = base.top();
        let active = top.as_ref();
        assert!(
            !active.base().is_finished(),
            "generator resumed after its body panicked"
        );
        match active.resume() {
            Step::Suspended => {
                if !same_frame(base.top(), top) {
                    continue;
                }
                assert!(
                    !matches!(active.base().produced(), Produced::Nothing),
                    "generator body awaited a future that is not a yield"
                );
                return Ok(());
            }
            Step::Returned => continue,
            Step::Finished => {
                return match root.take_failure() {
                    Some(failure) => {
                        debug!(serial = base.serial(), "Generator finished with a failure");
                        Err(failure)
                    }
                    None => Ok(()),
                };
            }
        }
    }
}

/// Whether two type-erased pointers name the same frame
pub(crate) fn same_frame<'a, Y>(a: ResumePtr<'a, Y>, b: ResumePtr<'a, Y>) -> bool {
    a.cast::<u8>() == b.cast::<u8>()
}

static DRIVER_VTABLE: RawWakerVTable =
    RawWakerVTable::new(clone_driver, ignore_driver, ignore_driver, ignore_driver);

unsafe fn clone_driver(data: *const ()) -> RawWaker {
    RawWaker::new(data, &DRIVER_VTABLE)
}

unsafe fn ignore_driver(_: *const ()) {}

fn driver_waker<Y>(base: &Base<'_, Y>) -> Waker {
    let data = (base as *const Base<'_, Y>).cast::<()>();
    unsafe { Waker::from_raw(RawWaker::new(data, &DRIVER_VTABLE)) }
}

/// Base of the frame currently polling a yield future created by handle `serial`
///
/// Panics when the future is polled by anything other than the frame that
/// owns the handle.
pub(crate) fn current<'a, Y>(cx: &Context<'_>, serial: u64) -> NonNull<Base<'a, Y>> {
    let waker = cx.waker();
    assert!(
        ptr::eq(waker.vtable(), &DRIVER_VTABLE),
        "generator yield awaited outside of a generator body"
    );
    let data = waker.data();
    let found = unsafe { data.cast::<u64>().read() };
    assert_eq!(
        found, serial,
        "yield handle awaited inside a different generator's body"
    );
    unsafe { NonNull::new_unchecked(data as *mut Base<'a, Y>) }
}
