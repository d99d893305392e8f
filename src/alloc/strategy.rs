//! Frame allocation strategies
//!
//! Block layout, in order:
//!
//! ```text
//! [ frame payload ][ release callback (Erased only) ][ allocator (stateful only) ][ padding ]
//! ```
//!
//! Every offset is derived from the payload layout alone, so release recomputes
//! exactly the block that allocation produced.

use super::{is_stateless, FrameAllocator, Global};
use crate::error::AllocError;
use std::alloc::{Layout, LayoutError};
use std::convert::Infallible;
use std::marker::PhantomData;
use std::ptr::NonNull;
use tracing::trace;

/// Release callback written after a type-erased frame
type ReleaseFn = unsafe fn(NonNull<u8>, Layout);

/// Placement of the bookkeeping inside a frame block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockLayout {
    /// Layout handed to the allocator
    pub block: Layout,
    /// Offset of the release callback
    pub callback: Option<usize>,
    /// Offset of the stored allocator
    pub allocator: Option<usize>,
}

impl BlockLayout {
    fn build(
        payload: Layout,
        callback: bool,
        allocator: Option<Layout>,
    ) -> Result<Self, LayoutError> {
        let mut block = payload;
        let mut callback_at = None;
        let mut allocator_at = None;

        if callback {
            let (extended, offset) = block.extend(Layout::new::<ReleaseFn>())?;
            block = extended;
            callback_at = Some(offset);
        }
        if let Some(stored) = allocator {
            let (extended, offset) = block.extend(stored)?;
            block = extended;
            allocator_at = Some(offset);
        }

        Ok(Self {
            block: block.pad_to_align(),
            callback: callback_at,
            allocator: allocator_at,
        })
    }

    /// Block layout used by [`Static<A>`]
    pub(crate) fn for_static<A: FrameAllocator>(payload: Layout) -> Result<Self, LayoutError> {
        let stored = (!is_stateless::<A>()).then(Layout::new::<A>);
        Self::build(payload, false, stored)
    }

    /// Block layout used by [`Erased`] for a frame built with `A`
    pub(crate) fn for_erased<A: FrameAllocator>(payload: Layout) -> Result<Self, LayoutError> {
        let stored = (!is_stateless::<A>()).then(Layout::new::<A>);
        Self::build(payload, true, stored)
    }
}

/// How a generator frame's block is returned to its allocator
///
/// # Safety
///
/// `release` must hand the block back to the allocator that produced it, using
/// the exact layout it was allocated with.
pub unsafe trait FrameStrategy {
    /// Strategy name recorded in trace events
    const NAME: &'static str;

    /// Return the block of a frame whose payload has layout `payload`
    ///
    /// # Safety
    ///
    /// `block` must come from this strategy for the same payload layout, and the
    /// payload must already be dropped.
    unsafe fn release(block: NonNull<u8>, payload: Layout);
}

/// Strategies that can place a frame using an allocator of type `A`
///
/// # Safety
///
/// Blocks returned by `allocate` must be releasable by
/// [`FrameStrategy::release`] for the same payload layout.
pub unsafe trait AllocateIn<A>: FrameStrategy {
    /// Allocate a block for a frame of layout `payload`
    fn allocate(alloc: A, payload: Layout) -> Result<NonNull<u8>, AllocError>;
}

/// Strategies usable without an explicit allocator argument
///
/// # Safety
///
/// Same contract as [`AllocateIn`].
pub unsafe trait DefaultAllocate: FrameStrategy {
    /// Allocate a block for a frame of layout `payload` from the default allocator
    fn allocate_default(payload: Layout) -> Result<NonNull<u8>, AllocError>;
}

/// Statically bound strategy: the allocator type is a type parameter
///
/// Never constructed; used only as a type argument of
/// [`Generator`](crate::Generator).
pub struct Static<A> {
    _never: Infallible,
    _alloc: PhantomData<fn() -> A>,
}

/// Type-erased strategy: the allocator is picked at construction time
///
/// Never constructed; used only as a type argument of
/// [`Generator`](crate::Generator).
pub enum Erased {}

unsafe impl<A: FrameAllocator> FrameStrategy for Static<A> {
    const NAME: &'static str = "static";

    unsafe fn release(block: NonNull<u8>, payload: Layout) {
        let layout = match BlockLayout::for_static::<A>(payload) {
            Ok(layout) => layout,
            Err(_) => unreachable!("frame layout was validated at allocation"),
        };
        give_back::<A>(block, layout, Self::NAME);
    }
}

unsafe impl<A: FrameAllocator> AllocateIn<A> for Static<A> {
    fn allocate(alloc: A, payload: Layout) -> Result<NonNull<u8>, AllocError> {
        let layout = BlockLayout::for_static::<A>(payload)?;
        place(alloc, layout, None, Self::NAME)
    }
}

unsafe impl<A: FrameAllocator + Default> DefaultAllocate for Static<A> {
    fn allocate_default(payload: Layout) -> Result<NonNull<u8>, AllocError> {
        <Self as AllocateIn<A>>::allocate(A::default(), payload)
    }
}

unsafe impl FrameStrategy for Erased {
    const NAME: &'static str = "erased";

    unsafe fn release(block: NonNull<u8>, payload: Layout) {
        // The callback sits at the same offset whatever allocator built the frame.
        let offset = match payload.extend(Layout::new::<ReleaseFn>()) {
            Ok((_, offset)) => offset,
            Err(_) => unreachable!("frame layout was validated at allocation"),
        };
        let release = block.as_ptr().add(offset).cast::<ReleaseFn>().read();
        release(block, payload);
    }
}

unsafe impl<A: FrameAllocator> AllocateIn<A> for Erased {
    fn allocate(alloc: A, payload: Layout) -> Result<NonNull<u8>, AllocError> {
        let layout = BlockLayout::for_erased::<A>(payload)?;
        place(alloc, layout, Some(release_erased::<A>), Self::NAME)
    }
}

unsafe impl DefaultAllocate for Erased {
    fn allocate_default(payload: Layout) -> Result<NonNull<u8>, AllocError> {
        <Self as AllocateIn<Global>>::allocate(Global, payload)
    }
}

/// Allocate `layout.block` from `alloc` and write the bookkeeping after the payload
fn place<A: FrameAllocator>(
    alloc: A,
    layout: BlockLayout,
    release: Option<ReleaseFn>,
    strategy: &'static str,
) -> Result<NonNull<u8>, AllocError> {
    let block = alloc.allocate(layout.block)?;
    unsafe {
        if let (Some(offset), Some(release)) = (layout.callback, release) {
            block.as_ptr().add(offset).cast::<ReleaseFn>().write(release);
        }
        if let Some(offset) = layout.allocator {
            block.as_ptr().add(offset).cast::<A>().write(alloc);
        }
    }
    trace!(
        strategy,
        size = layout.block.size(),
        align = layout.block.align(),
        stored_allocator = layout.allocator.is_some(),
        "Allocated frame block"
    );
    Ok(block)
}

/// Recover the allocator for a block and deallocate it
unsafe fn give_back<A: FrameAllocator>(
    block: NonNull<u8>,
    layout: BlockLayout,
    strategy: &'static str,
) {
    trace!(
        strategy,
        size = layout.block.size(),
        align = layout.block.align(),
        stored_allocator = layout.allocator.is_some(),
        "Releasing frame block"
    );
    match layout.allocator {
        Some(offset) => {
            let alloc = block.as_ptr().add(offset).cast::<A>().read();
            alloc.deallocate(block, layout.block);
        }
        None => match A::stateless() {
            Some(alloc) => alloc.deallocate(block, layout.block),
            None => unreachable!("allocator changed its stateless answer"),
        },
    }
}

/// Release callback stored by [`Erased`] for frames built with `A`
unsafe fn release_erased<A: FrameAllocator>(block: NonNull<u8>, payload: Layout) {
    let layout = match BlockLayout::for_erased::<A>(payload) {
        Ok(layout) => layout,
        Err(_) => unreachable!("frame layout was validated at allocation"),
    };
    give_back::<A>(block, layout, Erased::NAME);
}
