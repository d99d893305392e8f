//! Backing storage for suspended generator frames
//!
//! A [`FrameAllocator`] hands out raw blocks. A strategy from [`strategy`]
//! decides what bookkeeping travels with each block so the block can later be
//! returned to the allocator that produced it:
//!
//! - [`Static<A>`]: the allocator type is part of the generator's type
//! - [`Erased`]: the allocator is chosen per generator at runtime; a release
//!   callback is stored after the frame so every such generator shares one type

use crate::error::AllocError;
use std::alloc::Layout;
use std::ptr::NonNull;

pub mod strategy;

pub use strategy::{AllocateIn, DefaultAllocate, Erased, FrameStrategy, Static};

/// Raw memory provider for generator frames
///
/// # Safety
///
/// `allocate` must return a block valid for `layout` that stays valid until it
/// is passed back to `deallocate` with the same layout, on this instance or on
/// any instance returned by [`stateless`](FrameAllocator::stateless).
/// `stateless` must answer consistently: always `Some` or always `None` for a
/// given type.
pub unsafe trait FrameAllocator {
    /// Allocate a block for `layout`
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Return a block obtained from `allocate`
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on an equivalent allocator with exactly
    /// this `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// An instance interchangeable with every other instance of this type
    ///
    /// Allocators that answer `Some` are not stored alongside the frame; a
    /// fresh instance is produced when the frame is released.
    fn stateless() -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

/// The process heap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

unsafe impl FrameAllocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        // Frames always carry their base record, so they are never zero-sized.
        debug_assert!(layout.size() != 0);
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| AllocError::exhausted(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout)
    }

    fn stateless() -> Option<Self> {
        Some(Global)
    }
}

unsafe impl<A: FrameAllocator> FrameAllocator for &A {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}

/// Whether blocks from `A` skip storing the allocator
pub(crate) fn is_stateless<A: FrameAllocator>() -> bool {
    A::stateless().is_some()
}
