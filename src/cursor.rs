//! Position inside a running generator
//!
//! A [`Cursor`] reads the element exposed by the innermost active frame and
//! advances the chain one element at a time. Unlike [`Iterator`], it can lend
//! borrowed elements (`ByRef`, `ByMut`) without moving them out of the body.

use crate::frame::{self, Activation, Produced};
use crate::mode::{ByValue, Mode, Movable, Mutable};
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Lending iterator over borrowed elements
///
/// Each element borrows the streamer, so it must be dropped before the next
/// call. Intended for `while let` loops:
///
/// ```
/// use nestgen::{ByRef, Generator, Streamer};
/// use std::convert::Infallible;
///
/// fn words<'w>(text: &'w str) -> Generator<'w, String, Infallible, ByRef> {
///     Generator::new(move |co| async move {
///         for word in text.split_whitespace() {
///             let owned = word.to_uppercase();
///             co.yield_ref(&owned).await;
///         }
///     })
/// }
///
/// let mut gen = words("pull based sequence");
/// let mut cursor = gen.begin().unwrap();
/// let mut seen = Vec::new();
/// while let Some(word) = cursor.next() {
///     seen.push(word.unwrap().clone());
/// }
/// assert_eq!(seen, ["PULL", "BASED", "SEQUENCE"]);
/// ```
pub trait Streamer<'s> {
    type Item: 's;

    fn next(&'s mut self) -> Option<Self::Item>;
}

/// Borrowing iterator returned by [`Generator::begin`](crate::Generator::begin)
pub struct Cursor<'g, 'a, Y, E = Infallible, M: Mode = ByValue> {
    root: NonNull<dyn Activation<'a, Y, E> + 'a>,
    streamed: bool,
    _borrow: PhantomData<&'g mut ()>,
    _mode: PhantomData<fn() -> M>,
}

impl<'g, 'a, Y, E, M: Mode> Cursor<'g, 'a, Y, E, M> {
    pub(crate) fn new(root: NonNull<dyn Activation<'a, Y, E> + 'a>) -> Self {
        Self {
            root,
            streamed: false,
            _borrow: PhantomData,
            _mode: PhantomData,
        }
    }

    fn root(&self) -> &(dyn Activation<'a, Y, E> + 'a) {
        unsafe { self.root.as_ref() }
    }

    fn element(&self) -> Produced<Y> {
        assert!(!self.is_end(), "cursor dereferenced at end of sequence");
        unsafe { self.root().base().element() }
    }

    /// Whether the generator's body has finished
    pub fn is_end(&self) -> bool {
        self.root().base().is_finished()
    }

    /// Current element
    ///
    /// # Panics
    ///
    /// Panics at end of sequence or after the element was moved out with
    /// [`take`](Cursor::take).
    pub fn get(&self) -> &Y {
        match self.element() {
            Produced::Shared(ptr) | Produced::Exclusive(ptr) => unsafe { ptr.as_ref() },
            Produced::Owned(slot) => match unsafe { slot.as_ref() } {
                Some(value) => value,
                None => panic!("current element was already moved out"),
            },
            Produced::Nothing => unreachable!("suspended body produced nothing"),
        }
    }

    /// Current element, mutably
    ///
    /// For `ByMut` generators the change is made in the body's own variable.
    pub fn get_mut(&mut self) -> &mut Y
    where
        M: Mutable,
    {
        match self.element() {
            Produced::Exclusive(mut ptr) => unsafe { ptr.as_mut() },
            Produced::Owned(mut slot) => match unsafe { slot.as_mut() } {
                Some(value) => value,
                None => panic!("current element was already moved out"),
            },
            Produced::Shared(_) | Produced::Nothing => {
                unreachable!("mutable modes only produce exclusive or owned elements")
            }
        }
    }

    /// Move the current element out
    pub fn take(&mut self) -> Y
    where
        M: Movable,
    {
        match self.element() {
            Produced::Owned(mut slot) => match unsafe { slot.as_mut() }.take() {
                Some(value) => value,
                None => panic!("current element was already moved out"),
            },
            _ => unreachable!("by-value generators only produce owned elements"),
        }
    }

    /// Resume the innermost active frame until the next element
    ///
    /// # Panics
    ///
    /// Panics at end of sequence.
    pub fn advance(&mut self) -> Result<(), E> {
        assert!(!self.is_end(), "cursor advanced past end of sequence");
        self.streamed = false;
        unsafe { frame::drive(self.root()) }
    }
}

impl<'s, 'g, 'a, Y: 's, E: 's, M: Mode> Streamer<'s> for Cursor<'g, 'a, Y, E, M> {
    type Item = Result<&'s Y, E>;

    fn next(&'s mut self) -> Option<Result<&'s Y, E>> {
        if self.streamed {
            if self.is_end() {
                return None;
            }
            if let Err(failure) = self.advance() {
                return Some(Err(failure));
            }
        }
        self.streamed = true;
        if self.is_end() {
            None
        } else {
            Some(Ok(self.get()))
        }
    }
}

impl<'g, 'a, Y, E, M: Mode> fmt::Debug for Cursor<'g, 'a, Y, E, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("mode", &M::NAME)
            .field("at_end", &self.is_end())
            .finish()
    }
}
