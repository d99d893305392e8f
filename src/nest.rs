//! Flattening of nested generators
//!
//! Awaiting [`YieldAll`] links the child's frame under the chain's root and
//! points the root's `top` at the child, so the consumer's next resume goes
//! straight to it. When the child's body returns, its frame hands `top` back
//! to the parent recorded here and the driver resumes the parent in the same
//! step. Neither direction walks the chain.

use crate::alloc::{Erased, FrameStrategy};
use crate::frame::{self, Activation, Base, ResumePtr};
use crate::generator::Generator;
use crate::mode::Mode;
use std::cell::Cell;
use std::convert::Infallible;
use std::future::Future;
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::ptr::NonNull;
use std::task::{Context, Poll};
use tracing::trace;

/// Link from a nested frame back to the chain it runs in
pub(crate) struct Nest<'a, Y, E> {
    failure: Cell<Option<E>>,
    parent: ResumePtr<'a, Y>,
    root: Cell<NonNull<Base<'a, Y>>>,
}

impl<'a, Y, E> Nest<'a, Y, E> {
    pub(crate) fn fail(&self, failure: E) {
        self.failure.set(Some(failure));
    }

    /// Frame that awaited the child
    pub(crate) fn parent(&self) -> ResumePtr<'a, Y> {
        self.parent
    }

    pub(crate) fn root(&self) -> NonNull<Base<'a, Y>> {
        self.root.get()
    }

    pub(crate) fn set_root(&self, root: NonNull<Base<'a, Y>>) {
        self.root.set(root)
    }
}

/// Future returned by [`Co::yield_all`](crate::Co::yield_all)
///
/// Resolves to the child's outcome once every element it produced has been
/// consumed.
#[must_use = "nested generators produce nothing unless awaited"]
pub struct YieldAll<'a, Y, E, M: Mode, S: FrameStrategy> {
    serial: u64,
    child: Generator<'a, Y, E, M, S>,
    nest: Option<Nest<'a, Y, E>>,
    _pin: PhantomPinned,
}

impl<'a, Y, E, M: Mode, S: FrameStrategy> YieldAll<'a, Y, E, M, S> {
    pub(crate) fn new(serial: u64, child: Generator<'a, Y, E, M, S>) -> Self {
        Self {
            serial,
            child,
            nest: None,
            _pin: PhantomPinned,
        }
    }
}

impl<'a, Y: 'a, E: 'a, M: Mode, S: FrameStrategy> Future for YieldAll<'a, Y, E, M, S> {
    type Output = Result<(), E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), E>> {
        // The child's frame keeps a pointer to `nest`; it must not move.
        let this = unsafe { self.get_unchecked_mut() };

        if let Some(nest) = this.nest.take() {
            assert!(
                this.child.is_finished(),
                "nested generator polled again before it finished"
            );
            return Poll::Ready(match nest.failure.take() {
                Some(failure) => Err(failure),
                None => Ok(()),
            });
        }

        let Some(frame) = this.child.activation() else {
            return Poll::Ready(Ok(()));
        };
        let child = unsafe { frame.as_ref() };
        if child.base().is_finished() {
            return Poll::Ready(Ok(()));
        }

        let parent = unsafe { frame::current::<Y>(cx, this.serial).as_ref() };
        let root = unsafe { parent.this().as_ref() }.root();
        let nest = this.nest.insert(Nest {
            failure: Cell::new(None),
            parent: parent.this(),
            root: Cell::new(root),
        });
        child.attach(NonNull::from(&*nest));
        this.child.mark_started();

        let innermost = unsafe { enter(child, root) };
        unsafe { root.as_ref() }.set_top(innermost);
        trace!(
            parent = parent.serial(),
            child = child.base().serial(),
            strategy = S::NAME,
            mode = M::NAME,
            "Entered nested generator"
        );
        Poll::Pending
    }
}

impl<'a, Y, E, M: Mode, S: FrameStrategy> Drop for YieldAll<'a, Y, E, M, S> {
    fn drop(&mut self) {
        // Dropped while the child is still linked: give `top` back to the
        // parent before the child's frame goes away.
        if let Some(nest) = &self.nest {
            if !self.child.is_finished() {
                unsafe { nest.root().as_ref() }.set_top(nest.parent());
            }
        }
    }
}

/// Innermost frame to resume after linking `child` under `root`
///
/// A child that was driven on its own and is itself suspended inside a nested
/// generator keeps its chain; every link in that chain moves to the new root.
///
/// # Safety
///
/// `child` and every frame in its chain must be live.
unsafe fn enter<'a, Y, E>(
    child: &(dyn Activation<'a, Y, E> + 'a),
    root: NonNull<Base<'a, Y>>,
) -> ResumePtr<'a, Y> {
    let base = child.base();
    let innermost = base.top();
    let mut current = innermost;
    while !frame::same_frame(current, base.this()) {
        current = match current.as_ref().reroot(root) {
            Some(parent) => parent,
            None => unreachable!("nested frame without a link below its root"),
        };
    }
    base.set_top(base.this());
    innermost
}

/// Future returned by [`Co::yield_from`](crate::Co::yield_from) and its variants
#[must_use = "nested sequences produce nothing unless awaited"]
pub struct YieldFrom<'a, Y, M: Mode> {
    inner: YieldAll<'a, Y, Infallible, M, Erased>,
}

impl<'a, Y, M: Mode> YieldFrom<'a, Y, M> {
    pub(crate) fn new(inner: YieldAll<'a, Y, Infallible, M, Erased>) -> Self {
        Self { inner }
    }
}

impl<'a, Y: 'a, M: Mode> Future for YieldFrom<'a, Y, M> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let inner = unsafe { self.map_unchecked_mut(|this| &mut this.inner) };
        inner.poll(cx).map(|outcome| match outcome {
            Ok(()) => (),
            Err(never) => match never {},
        })
    }
}
