//! Yield primitives available to a generator body

use crate::alloc::{AllocateIn, Erased, FrameAllocator, FrameStrategy, Global};
use crate::frame::{self, Produced};
use crate::generator::Generator;
use crate::mode::{AcceptsMut, AcceptsOwned, AcceptsShared, ByValue, Flattens, Mode};
use crate::nest::{YieldAll, YieldFrom};
use std::convert::Infallible;
use std::future::Future;
use std::marker::{PhantomData, PhantomPinned};
use std::pin::Pin;
use std::ptr::NonNull;
use std::task::{Context, Poll};

/// Yield handle passed to a generator body
///
/// Every primitive returns a future that must be awaited inside the body of the
/// generator that received this handle. Awaiting it anywhere else panics.
pub struct Co<Y, M = ByValue> {
    serial: u64,
    _marker: PhantomData<(fn(Y) -> Y, fn() -> M)>,
}

impl<Y, M> Clone for Co<Y, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Y, M> Copy for Co<Y, M> {}

impl<Y, M> std::fmt::Debug for Co<Y, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Co").field("serial", &self.serial).finish()
    }
}

impl<Y, M: Mode> Co<Y, M> {
    pub(crate) fn new(serial: u64) -> Self {
        Self {
            serial,
            _marker: PhantomData,
        }
    }

    /// Produce an owned value
    ///
    /// The value lives in the suspended body until the consumer advances, and
    /// is dropped then unless the consumer moved it out.
    pub fn yield_(&self, value: Y) -> YieldValue<Y>
    where
        M: AcceptsOwned,
    {
        YieldValue {
            serial: self.serial,
            slot: Some(value),
            suspended: false,
            _pin: PhantomPinned,
        }
    }

    /// Produce a shared borrow of a value owned by the body
    pub fn yield_ref<'r>(&self, value: &'r Y) -> YieldRef<'r, Y>
    where
        M: AcceptsShared,
    {
        YieldRef {
            serial: self.serial,
            value,
            suspended: false,
        }
    }

    /// Produce an exclusive borrow of a value owned by the body
    ///
    /// Changes the consumer makes through the borrow are visible to the body
    /// once it resumes.
    pub fn yield_mut<'r>(&self, value: &'r mut Y) -> YieldMut<'r, Y>
    where
        M: AcceptsMut,
    {
        YieldMut {
            serial: self.serial,
            value,
            suspended: false,
        }
    }

    /// Produce every element of a nested generator, then continue
    ///
    /// While the child runs, the consumer resumes it directly, whatever the
    /// nesting depth. The awaited output is the child's outcome: a failure
    /// raised inside the child surfaces here, once the elements it produced
    /// before failing have been consumed.
    ///
    /// The child's mode must be one this generator's mode [`Flattens`]: the
    /// same mode, or a `ByValue` child under a `ByRef` parent.
    ///
    /// The child's frame strategy is a free parameter, so a child built inline
    /// needs its type spelled out. [`yield_nested`](Co::yield_nested) covers
    /// the common heap-allocated case:
    ///
    /// ```
    /// use nestgen::alloc::Erased;
    /// use nestgen::Generator;
    ///
    /// let gen: Generator<'static, u8> = Generator::new(|co| async move {
    ///     co.yield_(1).await;
    ///     let child: Generator<'static, u8, _, _, Erased> = Generator::new(|co| async move {
    ///         co.yield_(2).await;
    ///     });
    ///     co.yield_all(child).await;
    ///     co.yield_nested(Generator::new(|co| async move {
    ///         co.yield_(3).await;
    ///     }))
    ///     .await;
    /// });
    /// assert_eq!(gen.collect::<Vec<_>>(), [1, 2, 3]);
    /// ```
    pub fn yield_all<'a, E, C, S>(&self, child: Generator<'a, Y, E, C, S>) -> YieldAll<'a, Y, E, C, S>
    where
        C: Mode,
        M: Flattens<C>,
        S: FrameStrategy,
    {
        YieldAll::new(self.serial, child)
    }

    /// Flatten a heap-allocated child of this generator's own mode
    ///
    /// Same as [`yield_all`](Co::yield_all) with the child's mode and
    /// strategy fixed, so `co.yield_nested(Generator::new(..))` infers.
    pub fn yield_nested<'a, E>(&self, child: Generator<'a, Y, E, M, Erased>) -> YieldAll<'a, Y, E, M, Erased> {
        YieldAll::new(self.serial, child)
    }

    /// Produce every element of an iterable, converted into `Y`
    ///
    /// The iterable is wrapped in a pass-through generator allocated on the
    /// heap. Generators should be flattened with [`yield_all`](Co::yield_all)
    /// instead, which keeps resumption independent of depth.
    pub fn yield_from<'a, I>(&self, items: I) -> YieldFrom<'a, Y, M>
    where
        I: IntoIterator + 'a,
        I::IntoIter: 'a,
        I::Item: Into<Y> + 'a,
        Y: 'a,
        M: AcceptsOwned,
    {
        self.yield_from_in(items, Global)
    }

    /// Like [`yield_from`](Co::yield_from), allocating the pass-through
    /// generator from `alloc`
    pub fn yield_from_in<'a, I, A>(&self, items: I, alloc: A) -> YieldFrom<'a, Y, M>
    where
        I: IntoIterator + 'a,
        I::IntoIter: 'a,
        I::Item: Into<Y> + 'a,
        Y: 'a,
        M: AcceptsOwned,
        A: FrameAllocator + 'a,
        Erased: AllocateIn<A>,
    {
        let source = Generator::<'a, Y, Infallible, M, Erased>::new_in(alloc, move |co| async move {
            for item in items {
                co.yield_(item.into()).await;
            }
        });
        YieldFrom::new(YieldAll::new(self.serial, source))
    }

    /// Produce every element of an iterable of exclusive borrows
    pub fn yield_from_mut<'a, 'r, I>(&self, items: I) -> YieldFrom<'a, Y, M>
    where
        I: IntoIterator<Item = &'r mut Y> + 'a,
        I::IntoIter: 'a,
        'r: 'a,
        Y: 'r + 'a,
        M: AcceptsMut,
    {
        let source = Generator::<'a, Y, Infallible, M, Erased>::new(move |co| async move {
            for item in items {
                co.yield_mut(item).await;
            }
        });
        YieldFrom::new(YieldAll::new(self.serial, source))
    }
}

/// How a generator body finishes
///
/// Bodies that cannot fail may end with `()`; fallible bodies end with
/// `Result<(), E>`.
///
/// An endless `loop` has type `!`, which is neither. Give it an exit or
/// follow it with an explicit `()` tail.
pub trait Completion<E> {
    fn into_outcome(self) -> Result<(), E>;
}

impl Completion<Infallible> for () {
    fn into_outcome(self) -> Result<(), Infallible> {
        Ok(())
    }
}

impl<E> Completion<E> for Result<(), E> {
    fn into_outcome(self) -> Result<(), E> {
        self
    }
}

/// Future returned by [`Co::yield_`]
#[must_use = "yields do nothing unless awaited"]
pub struct YieldValue<Y> {
    serial: u64,
    slot: Option<Y>,
    suspended: bool,
    _pin: PhantomPinned,
}

impl<Y> Future for YieldValue<Y> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // The slot is exposed by address; it must not move once published.
        let this = unsafe { self.get_unchecked_mut() };
        if this.suspended {
            return Poll::Ready(());
        }
        let base = unsafe { frame::current::<Y>(cx, this.serial).as_ref() };
        base.produce(Produced::Owned(NonNull::from(&mut this.slot)));
        this.suspended = true;
        Poll::Pending
    }
}

/// Future returned by [`Co::yield_ref`]
#[must_use = "yields do nothing unless awaited"]
pub struct YieldRef<'r, Y> {
    serial: u64,
    value: &'r Y,
    suspended: bool,
}

impl<Y> Future for YieldRef<'_, Y> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.suspended {
            return Poll::Ready(());
        }
        let base = unsafe { frame::current::<Y>(cx, this.serial).as_ref() };
        base.produce(Produced::Shared(NonNull::from(this.value)));
        this.suspended = true;
        Poll::Pending
    }
}

/// Future returned by [`Co::yield_mut`]
#[must_use = "yields do nothing unless awaited"]
pub struct YieldMut<'r, Y> {
    serial: u64,
    value: &'r mut Y,
    suspended: bool,
}

impl<Y> Future for YieldMut<'_, Y> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.suspended {
            return Poll::Ready(());
        }
        let base = unsafe { frame::current::<Y>(cx, this.serial).as_ref() };
        base.produce(Produced::Exclusive(NonNull::from(&mut *this.value)));
        this.suspended = true;
        Poll::Pending
    }
}
