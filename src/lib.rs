//! Nestgen: Lazy Pull-Based Generators
//!
//! A generator's body is ordinary sequential code, written as an `async`
//! block, that suspends at every produced element and resumes when the
//! consumer asks for the next one. Bodies can flatten other generators with
//! [`Co::yield_all`]; the consumer then resumes the innermost active body
//! directly, so advancing costs the same at any nesting depth.
//!
//! ```
//! use nestgen::Generator;
//!
//! fn countdown(from: u32) -> Generator<'static, u32> {
//!     Generator::new(move |co| async move {
//!         if from == 0 {
//!             return;
//!         }
//!         co.yield_(from).await;
//!         let _ = co.yield_all(countdown(from - 1)).await;
//!     })
//! }
//!
//! assert_eq!(countdown(3).collect::<Vec<_>>(), vec![3, 2, 1]);
//! ```
//!
//! Frames are allocated through a pluggable strategy, see [`alloc`]. The
//! reference category of elements is chosen per generator, see [`mode`].

pub mod alloc;
pub mod config;
pub mod cursor;
pub mod error;
pub mod generator;
pub mod logging;
pub mod mode;

mod co;
mod frame;
mod nest;

pub use co::{Co, Completion, YieldMut, YieldRef, YieldValue};
pub use cursor::{Cursor, Streamer};
pub use generator::{Generator, TryIter};
pub use mode::{ByMut, ByRef, ByValue, Flattens, Mode};
pub use nest::{YieldAll, YieldFrom};
