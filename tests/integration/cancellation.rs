//! Integration tests for tearing down suspended generators

use nestgen::alloc::{FrameAllocator, Global};
use nestgen::error::AllocError;
use nestgen::Generator;
use std::alloc::Layout;
use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

/// Records its own teardown
struct Guard {
    name: String,
    log: Log,
}

impl Guard {
    fn new(name: impl Into<String>, log: &Log) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.log.borrow_mut().push(format!("drop {}", self.name));
    }
}

/// Records block releases into the same log as the guards
struct Tracing {
    name: String,
    log: Log,
}

unsafe impl FrameAllocator for Tracing {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.log.borrow_mut().push(format!("release {}", self.name));
        Global.deallocate(ptr, layout)
    }
}

fn level(depth: usize, max: usize, log: Log) -> Generator<'static, usize> {
    let alloc = Tracing {
        name: format!("frame{}", depth),
        log: log.clone(),
    };
    Generator::new_in(alloc, move |co| async move {
        let _first = Guard::new(format!("{}a", depth), &log);
        let _second = Guard::new(format!("{}b", depth), &log);
        if depth == max {
            co.yield_(depth).await;
        } else {
            let _ = co.yield_all(level(depth + 1, max, log.clone())).await;
        }
        log.borrow_mut().push(format!("finish {}", depth));
    })
}

/// Test that dropping mid-composition runs every live local once, innermost first
#[test]
fn test_drop_while_suspended_three_levels_deep() {
    let log = Log::default();
    let mut gen = level(0, 2, log.clone());
    assert_eq!(gen.next(), Some(2));
    assert!(log.borrow().is_empty());

    drop(gen);
    assert_eq!(
        *log.borrow(),
        vec![
            "drop 2b",
            "drop 2a",
            "release frame2",
            "drop 1b",
            "drop 1a",
            "release frame1",
            "drop 0b",
            "drop 0a",
            "release frame0",
        ]
    );
}

/// Test that running to completion tears down each level as it returns
#[test]
fn test_completion_releases_in_order() {
    let log = Log::default();
    let gen = level(0, 1, log.clone());
    assert_eq!(gen.collect::<Vec<_>>(), vec![1]);
    assert_eq!(
        *log.borrow(),
        vec![
            "finish 1",
            "drop 1b",
            "drop 1a",
            "release frame1",
            "finish 0",
            "drop 0b",
            "drop 0a",
            "release frame0",
        ]
    );
}

/// Test that a generator dropped before it starts never runs its body
#[test]
fn test_drop_unstarted() {
    let log = Log::default();
    let gen = level(0, 3, log.clone());
    drop(gen);
    assert_eq!(*log.borrow(), vec!["release frame0"]);
}

/// Test that a cursor's generator can be dropped mid-sequence
#[test]
fn test_drop_after_partial_cursor_walk() {
    let log = Log::default();
    let mut gen: Generator<'static, u8> = {
        let log = log.clone();
        Generator::new(move |co| async move {
            let _guard = Guard::new("body", &log);
            for n in 0..10 {
                co.yield_(n).await;
            }
        })
    };
    {
        let mut cursor = gen.begin().unwrap();
        cursor.advance().unwrap();
        assert_eq!(*cursor.get(), 1);
    }
    assert!(log.borrow().is_empty());
    drop(gen);
    assert_eq!(*log.borrow(), vec!["drop body"]);
}
