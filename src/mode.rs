//! Reference categories of yielded elements
//!
//! A generator's mode decides which yield primitives its body may use and what
//! the consumer may do with the current element:
//!
//! | Mode        | `yield_(Y)` | `yield_mut(&mut Y)` | `yield_ref(&Y)` | consumer                     |
//! |-------------|-------------|---------------------|-----------------|------------------------------|
//! | [`ByValue`] | yes         | no                  | no              | read, mutate, move out       |
//! | [`ByRef`]   | yes         | yes                 | yes             | read                         |
//! | [`ByMut`]   | no          | yes                 | no              | read, mutate in place        |
//!
//! Combinations marked "no" are rejected at compile time:
//!
//! ```compile_fail
//! use nestgen::Generator;
//!
//! fn lvalues() -> Generator<'static, String> {
//!     Generator::new(|co| async move {
//!         let s = String::from("kept");
//!         co.yield_ref(&s).await;
//!     })
//! }
//! ```
//!
//! ```compile_fail
//! use nestgen::{ByMut, Generator};
//! use std::convert::Infallible;
//!
//! fn temporaries() -> Generator<'static, String, Infallible, ByMut> {
//!     Generator::new(|co| async move {
//!         co.yield_(String::from("temporary")).await;
//!     })
//! }
//! ```
//!
//! ```compile_fail
//! use nestgen::Generator;
//!
//! fn borrowed() -> Generator<'static, String> {
//!     Generator::new(|co| async move {
//!         let mut s = String::from("kept");
//!         co.yield_mut(&mut s).await;
//!     })
//! }
//! ```
//!
//! ```compile_fail
//! use nestgen::{ByMut, Generator};
//! use std::convert::Infallible;
//!
//! fn shared() -> Generator<'static, String, Infallible, ByMut> {
//!     Generator::new(|co| async move {
//!         let s = String::from("kept");
//!         co.yield_ref(&s).await;
//!     })
//! }
//! ```
//!
//! A nested generator is flattened into a parent of the same mode, or a
//! `ByValue` child into a `ByRef` parent, whose consumer only reads. Any other
//! pairing is rejected:
//!
//! ```compile_fail
//! use nestgen::{ByRef, Generator};
//! use std::convert::Infallible;
//!
//! fn child() -> Generator<'static, u8, Infallible, ByRef> {
//!     Generator::new(|co| async move {
//!         co.yield_(1).await;
//!     })
//! }
//!
//! fn parent() -> Generator<'static, u8> {
//!     Generator::new(|co| async move {
//!         co.yield_all(child()).await;
//!     })
//! }
//! ```

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::ByValue {}
    impl Sealed for super::ByRef {}
    impl Sealed for super::ByMut {}
}

/// A reference category
pub trait Mode: sealed::Sealed + 'static {
    /// Name recorded in trace events
    const NAME: &'static str;
}

/// Elements are owned by the suspended body and may be moved out by the consumer
pub enum ByValue {}

/// Elements are exposed as shared references
pub enum ByRef {}

/// Elements are exposed as exclusive references into the body's own state
pub enum ByMut {}

impl Mode for ByValue {
    const NAME: &'static str = "by-value";
}

impl Mode for ByRef {
    const NAME: &'static str = "by-ref";
}

impl Mode for ByMut {
    const NAME: &'static str = "by-mut";
}

/// Modes whose body may yield owned temporaries
pub trait AcceptsOwned: Mode {}

/// Modes whose body may yield shared borrows of its locals
pub trait AcceptsShared: Mode {}

/// Modes whose body may yield exclusive borrows of its locals
pub trait AcceptsMut: Mode {}

/// Modes whose consumer may mutate the current element
pub trait Mutable: Mode {}

/// Modes whose consumer may move the current element out
pub trait Movable: Mutable {}

impl AcceptsOwned for ByValue {}
impl AcceptsOwned for ByRef {}

impl AcceptsShared for ByRef {}

impl AcceptsMut for ByRef {}
impl AcceptsMut for ByMut {}

impl Mutable for ByValue {}
impl Mutable for ByMut {}

impl Movable for ByValue {}

/// Parent modes that may flatten a nested generator of mode `C`
pub trait Flattens<C: Mode>: Mode {}

impl Flattens<ByValue> for ByValue {}
impl Flattens<ByRef> for ByRef {}
impl Flattens<ByMut> for ByMut {}
impl Flattens<ByValue> for ByRef {}
