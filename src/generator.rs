//! The owning handle of a generator
//!
//! A [`Generator`] owns one frame: the body future plus its bookkeeping,
//! placed in a block obtained through the strategy `S`. Construction only
//! places the frame; the body starts running on the first resume.

use crate::alloc::{AllocateIn, DefaultAllocate, Erased, FrameStrategy};
use crate::co::{Co, Completion};
use crate::cursor::Cursor;
use crate::error::AllocError;
use crate::frame::{self, Activation, Frame, Produced, ResumePtr};
use crate::mode::{ByValue, Mode, Movable};
use std::alloc::{handle_alloc_error, Layout};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use tracing::trace;

type FramePtr<'a, Y, E> = NonNull<dyn Activation<'a, Y, E> + 'a>;

/// A lazily evaluated sequence of `Y` produced by a suspendable body
///
/// - `E`: failure type of the body (`Infallible` for bodies that cannot fail)
/// - `M`: reference category of the elements, see [`mode`](crate::mode)
/// - `S`: how the frame's block is allocated, see [`alloc`](crate::alloc)
///
/// # Example
///
/// ```
/// use nestgen::Generator;
///
/// fn squares(limit: u32) -> Generator<'static, u32> {
///     Generator::new(move |co| async move {
///         for n in 1..=limit {
///             co.yield_(n * n).await;
///         }
///     })
/// }
///
/// assert_eq!(squares(4).collect::<Vec<_>>(), vec![1, 4, 9, 16]);
/// ```
pub struct Generator<'a, Y, E = Infallible, M: Mode = ByValue, S: FrameStrategy = Erased> {
    frame: Option<FramePtr<'a, Y, E>>,
    started: bool,
    _marker: PhantomData<(fn() -> M, fn() -> S, Y, E)>,
}

impl<'a, Y: 'a, E: 'a, M: Mode, S: FrameStrategy> Generator<'a, Y, E, M, S> {
    /// Create a generator whose frame comes from the strategy's default allocator
    ///
    /// The body's output must be a [`Completion`]. A body that never returns
    /// still has to end in one, either through a loop exit or a `()` tail
    /// after the loop:
    ///
    /// ```
    /// use nestgen::Generator;
    ///
    /// #[allow(unreachable_code)]
    /// fn naturals() -> Generator<'static, u64> {
    ///     Generator::new(|co| async move {
    ///         let mut n = 0;
    ///         loop {
    ///             co.yield_(n).await;
    ///             n += 1;
    ///         }
    ///         ()
    ///     })
    /// }
    ///
    /// assert_eq!(naturals().take(4).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    /// ```
    ///
    /// # Panics
    ///
    /// Aborts through [`handle_alloc_error`] when the allocator is exhausted,
    /// and panics when the frame's layout overflows.
    pub fn new<P, Fut>(producer: P) -> Self
    where
        S: DefaultAllocate,
        P: FnOnce(Co<Y, M>) -> Fut,
        Fut: Future + 'a,
        Fut::Output: Completion<E>,
    {
        unwrap_placed(Self::try_new(producer))
    }

    /// Like [`new`](Generator::new), reporting allocation failure
    pub fn try_new<P, Fut>(producer: P) -> Result<Self, AllocError>
    where
        S: DefaultAllocate,
        P: FnOnce(Co<Y, M>) -> Fut,
        Fut: Future + 'a,
        Fut::Output: Completion<E>,
    {
        Self::place(producer, S::allocate_default)
    }

    /// Create a generator whose frame comes from `alloc`
    ///
    /// With [`Erased`] any allocator is accepted and the generator's type does
    /// not mention it. With [`Static<A>`](crate::alloc::Static) the allocator
    /// must be exactly `A`.
    ///
    /// # Panics
    ///
    /// Same as [`new`](Generator::new).
    pub fn new_in<A, P, Fut>(alloc: A, producer: P) -> Self
    where
        S: AllocateIn<A>,
        A: 'a,
        P: FnOnce(Co<Y, M>) -> Fut,
        Fut: Future + 'a,
        Fut::Output: Completion<E>,
    {
        unwrap_placed(Self::try_new_in(alloc, producer))
    }

    /// Like [`new_in`](Generator::new_in), reporting allocation failure
    pub fn try_new_in<A, P, Fut>(alloc: A, producer: P) -> Result<Self, AllocError>
    where
        S: AllocateIn<A>,
        A: 'a,
        P: FnOnce(Co<Y, M>) -> Fut,
        Fut: Future + 'a,
        Fut::Output: Completion<E>,
    {
        Self::place(producer, move |payload| S::allocate(alloc, payload))
    }

    fn place<P, Fut>(
        producer: P,
        allocate: impl FnOnce(Layout) -> Result<NonNull<u8>, AllocError>,
    ) -> Result<Self, AllocError>
    where
        P: FnOnce(Co<Y, M>) -> Fut,
        Fut: Future + 'a,
        Fut::Output: Completion<E>,
    {
        let serial = frame::next_serial();
        let body = producer(Co::new(serial));
        let payload = Layout::new::<Frame<'a, Y, E, Fut>>();
        let block = allocate(payload)?.cast::<Frame<'a, Y, E, Fut>>();

        let this: ResumePtr<'a, Y> = block;
        unsafe { block.as_ptr().write(Frame::new(serial, this, body)) };
        let frame: FramePtr<'a, Y, E> = block;

        trace!(
            serial,
            strategy = S::NAME,
            mode = M::NAME,
            size = payload.size(),
            "Created generator"
        );
        Ok(Self {
            frame: Some(frame),
            started: false,
            _marker: PhantomData,
        })
    }
}

impl<'a, Y, E, M: Mode, S: FrameStrategy> Generator<'a, Y, E, M, S> {
    /// A handle that owns no frame
    pub fn null() -> Self {
        Self {
            frame: None,
            started: false,
            _marker: PhantomData,
        }
    }

    /// Move the frame out, leaving a null handle behind
    ///
    /// Same as `std::mem::take(&mut gen)`. Named apart from `Iterator::take`,
    /// which by-value generators also have.
    pub fn take_handle(&mut self) -> Self {
        mem::replace(self, Self::null())
    }

    pub fn is_null(&self) -> bool {
        self.frame.is_none()
    }

    /// Whether the body has returned or panicked
    ///
    /// A null handle counts as finished.
    pub fn is_finished(&self) -> bool {
        match self.frame {
            Some(frame) => unsafe { frame.as_ref() }.base().is_finished(),
            None => true,
        }
    }

    /// Run the body up to its first element
    ///
    /// # Panics
    ///
    /// Panics if the handle is null or was already started.
    pub fn begin(&mut self) -> Result<Cursor<'_, 'a, Y, E, M>, E> {
        let frame = match self.frame {
            Some(frame) => frame,
            None => panic!("begin called on a null generator"),
        };
        assert!(!self.started, "begin called on a generator that already started");
        self.started = true;
        unsafe { frame::drive(frame.as_ref())? };
        Ok(Cursor::new(frame))
    }

    /// Iterate over owned elements, reporting a failure of the body once
    pub fn try_iter(self) -> TryIter<'a, Y, E, M, S>
    where
        M: Movable,
    {
        TryIter {
            generator: self,
            done: false,
        }
    }

    pub(crate) fn activation(&self) -> Option<FramePtr<'a, Y, E>> {
        self.frame
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    /// Resume once and move the produced element out
    fn step(&mut self) -> Result<Option<Y>, E>
    where
        M: Movable,
    {
        let Some(frame) = self.frame else {
            return Ok(None);
        };
        let activation = unsafe { frame.as_ref() };
        if activation.base().is_finished() {
            return Ok(None);
        }
        self.started = true;
        unsafe { frame::drive(activation)? };
        if activation.base().is_finished() {
            return Ok(None);
        }
        match unsafe { activation.base().element() } {
            Produced::Owned(slot) => Ok(unsafe { (*slot.as_ptr()).take() }),
            _ => unreachable!("by-value generators only produce owned elements"),
        }
    }
}

fn unwrap_placed<T>(placed: Result<T, AllocError>) -> T {
    match placed {
        Ok(value) => value,
        Err(AllocError::Exhausted { layout }) => handle_alloc_error(layout),
        Err(err) => panic!("{err}"),
    }
}

impl<'a, Y, E, M: Mode, S: FrameStrategy> Default for Generator<'a, Y, E, M, S> {
    fn default() -> Self {
        Self::null()
    }
}

impl<'a, Y, E, M: Mode, S: FrameStrategy> Drop for Generator<'a, Y, E, M, S> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            unsafe {
                let payload = Layout::for_value(frame.as_ref());
                ptr::drop_in_place(frame.as_ptr());
                S::release(frame.cast(), payload);
            }
        }
    }
}

impl<'a, Y, E, M: Mode, S: FrameStrategy> fmt::Debug for Generator<'a, Y, E, M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let finished = self
            .frame
            .map(|frame| unsafe { frame.as_ref() }.base().is_finished());
        f.debug_struct("Generator")
            .field("mode", &M::NAME)
            .field("strategy", &S::NAME)
            .field("started", &self.started)
            .field("finished", &finished)
            .finish()
    }
}

impl<'a, Y: 'a, S: FrameStrategy> Iterator for Generator<'a, Y, Infallible, ByValue, S> {
    type Item = Y;

    fn next(&mut self) -> Option<Y> {
        match self.step() {
            Ok(item) => item,
            Err(never) => match never {},
        }
    }
}

impl<'a, Y: 'a, S: FrameStrategy> FusedIterator for Generator<'a, Y, Infallible, ByValue, S> {}

/// Iterator returned by [`Generator::try_iter`]
pub struct TryIter<'a, Y, E, M: Mode = ByValue, S: FrameStrategy = Erased> {
    generator: Generator<'a, Y, E, M, S>,
    done: bool,
}

impl<'a, Y: 'a, E: 'a, M: Movable, S: FrameStrategy> TryIter<'a, Y, E, M, S> {
    /// Give back the generator, for instance to inspect `is_finished`
    pub fn into_inner(self) -> Generator<'a, Y, E, M, S> {
        self.generator
    }
}

impl<'a, Y: 'a, E: 'a, M: Movable, S: FrameStrategy> Iterator for TryIter<'a, Y, E, M, S> {
    type Item = Result<Y, E>;

    fn next(&mut self) -> Option<Result<Y, E>> {
        if self.done {
            return None;
        }
        match self.generator.step() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(failure) => {
                self.done = true;
                Some(Err(failure))
            }
        }
    }
}

impl<'a, Y: 'a, E: 'a, M: Movable, S: FrameStrategy> FusedIterator for TryIter<'a, Y, E, M, S> {}

impl<'a, Y, E, M: Mode, S: FrameStrategy> fmt::Debug for TryIter<'a, Y, E, M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryIter")
            .field("generator", &self.generator)
            .field("done", &self.done)
            .finish()
    }
}
