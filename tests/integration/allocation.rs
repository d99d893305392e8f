//! Integration tests for frame allocation strategies

use nestgen::alloc::{Erased, FrameAllocator, Global, Static};
use nestgen::error::AllocError;
use nestgen::{ByValue, Generator};
use std::alloc::Layout;
use std::cell::RefCell;
use std::convert::Infallible;
use std::ptr::NonNull;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Allocate { id: u32, ptr: usize, layout: Layout },
    Deallocate { id: u32, ptr: usize, layout: Layout },
}

type Log = Rc<RefCell<Vec<Event>>>;

/// Stateful allocator recording every call under its id
#[derive(Debug, Clone)]
struct Recording {
    id: u32,
    log: Log,
}

impl PartialEq for Recording {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Recording {
    fn new(id: u32) -> (Self, Log) {
        let log = Log::default();
        (Self { id, log: log.clone() }, log)
    }
}

unsafe impl FrameAllocator for Recording {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = Global.allocate(layout)?;
        self.log.borrow_mut().push(Event::Allocate {
            id: self.id,
            ptr: ptr.as_ptr() as usize,
            layout,
        });
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.log.borrow_mut().push(Event::Deallocate {
            id: self.id,
            ptr: ptr.as_ptr() as usize,
            layout,
        });
        Global.deallocate(ptr, layout)
    }
}

thread_local! {
    static STATELESS_LOG: RefCell<Vec<Event>> = const { RefCell::new(Vec::new()) };
}

/// Stateless allocator recording into a thread-local log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counting;

unsafe impl FrameAllocator for Counting {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = Global.allocate(layout)?;
        STATELESS_LOG.with(|log| {
            log.borrow_mut().push(Event::Allocate {
                id: 0,
                ptr: ptr.as_ptr() as usize,
                layout,
            })
        });
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        STATELESS_LOG.with(|log| {
            log.borrow_mut().push(Event::Deallocate {
                id: 0,
                ptr: ptr.as_ptr() as usize,
                layout,
            })
        });
        Global.deallocate(ptr, layout)
    }

    fn stateless() -> Option<Self> {
        Some(Counting)
    }
}

/// Allocator that always fails
#[derive(Debug, Clone, Copy, Default)]
struct Exhausted;

unsafe impl FrameAllocator for Exhausted {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        Err(AllocError::exhausted(layout))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        unreachable!("nothing was allocated")
    }
}

/// Assert the log holds one allocation and a matching deallocation
fn assert_round_trip(events: &[Event]) {
    match events {
        [Event::Allocate {
            id: a,
            ptr: p,
            layout: l,
        }, Event::Deallocate {
            id: b,
            ptr: q,
            layout: m,
        }] => {
            assert_eq!(a, b, "block returned to a different allocator");
            assert_eq!(p, q);
            assert_eq!(l, m, "layout changed between allocate and deallocate");
        }
        other => panic!("expected one allocate/deallocate pair, got {:?}", other),
    }
}

fn drain<'a, S: nestgen::alloc::FrameStrategy>(
    gen: Generator<'a, u32, Infallible, ByValue, S>,
) -> Vec<u32> {
    gen.collect()
}

/// Test stateless allocator with the static strategy
#[test]
fn test_static_stateless_round_trip() {
    STATELESS_LOG.with(|log| log.borrow_mut().clear());
    let gen: Generator<'static, u32, Infallible, ByValue, Static<Counting>> =
        Generator::new(|co| async move {
            co.yield_(1).await;
            co.yield_(2).await;
        });
    assert_eq!(drain(gen), vec![1, 2]);
    STATELESS_LOG.with(|log| assert_round_trip(&log.borrow()));
}

/// Test stateful allocator with the static strategy
#[test]
fn test_static_stateful_round_trip() {
    let (alloc, log) = Recording::new(7);
    let gen: Generator<'static, u32, Infallible, ByValue, Static<Recording>> =
        Generator::new_in(alloc, |co| async move {
            co.yield_(3).await;
        });
    assert_eq!(drain(gen), vec![3]);
    assert_round_trip(&log.borrow());
}

/// Test stateless allocator with the type-erased strategy
#[test]
fn test_erased_stateless_round_trip() {
    STATELESS_LOG.with(|log| log.borrow_mut().clear());
    let gen: Generator<'static, u32> = Generator::new_in(Counting, |co| async move {
        co.yield_(4).await;
    });
    assert_eq!(drain(gen), vec![4]);
    STATELESS_LOG.with(|log| assert_round_trip(&log.borrow()));
}

/// Test stateful allocator with the type-erased strategy
#[test]
fn test_erased_stateful_round_trip() {
    let (alloc, log) = Recording::new(9);
    let gen: Generator<'static, u32, Infallible, ByValue, Erased> =
        Generator::new_in(alloc, |co| async move {
            co.yield_(5).await;
        });
    assert_eq!(drain(gen), vec![5]);
    assert_round_trip(&log.borrow());
}

/// Test that generators built with different allocators share one type
#[test]
fn test_erased_generators_share_a_type() {
    let (first, first_log) = Recording::new(1);
    let (second, second_log) = Recording::new(2);
    let gens: Vec<Generator<'static, u32>> = vec![
        Generator::new_in(first, |co| async move { co.yield_(1).await }),
        Generator::new_in(second, |co| async move { co.yield_(2).await }),
        Generator::new(|co| async move { co.yield_(3).await }),
    ];
    let values: Vec<u32> = gens.into_iter().flatten().collect();
    assert_eq!(values, vec![1, 2, 3]);
    assert_round_trip(&first_log.borrow());
    assert_round_trip(&second_log.borrow());
}

/// Test that a borrowed allocator is used for the frame and outlives it
#[test]
fn test_borrowed_allocator() {
    let (alloc, log) = Recording::new(3);
    {
        let gen: Generator<'_, u32> = Generator::new_in(&alloc, |co| async move {
            co.yield_(6).await;
        });
        assert_eq!(drain(gen), vec![6]);
    }
    assert_round_trip(&log.borrow());
}

/// Test that an unconsumed generator still returns its block
#[test]
fn test_dropping_unstarted_generator_releases_block() {
    let (alloc, log) = Recording::new(4);
    let gen: Generator<'static, u32> = Generator::new_in(alloc, |co| async move {
        co.yield_(7).await;
    });
    assert_eq!(log.borrow().len(), 1);
    drop(gen);
    assert_round_trip(&log.borrow());
}

/// Test that every frame of a nested chain goes back to its own allocator
#[test]
fn test_nested_frames_use_their_own_allocators() {
    let (outer_alloc, outer_log) = Recording::new(10);
    let (inner_alloc, inner_log) = Recording::new(20);
    let inner: Generator<'static, u32> = Generator::new_in(inner_alloc, |co| async move {
        co.yield_(1).await;
    });
    let outer: Generator<'static, u32> = Generator::new_in(outer_alloc, move |co| async move {
        let _ = co.yield_all(inner).await;
        co.yield_(2).await;
    });
    assert_eq!(drain(outer), vec![1, 2]);
    assert_round_trip(&outer_log.borrow());
    assert_round_trip(&inner_log.borrow());
}

/// Test that allocation failure is reported by the fallible constructors
#[test]
fn test_try_new_in_reports_exhaustion() {
    let result: Result<Generator<'static, u32>, AllocError> =
        Generator::try_new_in(Exhausted, |co| async move {
            co.yield_(1).await;
        });
    match result {
        Err(AllocError::Exhausted { layout }) => assert!(layout.size() > 0),
        other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
    }
}

/// Test that yield_from_in places the pass-through frame in the given allocator
#[test]
fn test_yield_from_in_uses_given_allocator() {
    let (alloc, log) = Recording::new(30);
    let gen: Generator<'static, u32> = Generator::new(move |co| async move {
        co.yield_from_in(vec![1u16, 2], alloc).await;
    });
    assert_eq!(drain(gen), vec![1, 2]);
    assert_round_trip(&log.borrow());
}
