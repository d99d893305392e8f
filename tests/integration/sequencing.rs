//! Integration tests for plain sequencing and the consumer protocols

use nestgen::{Generator, Streamer};
use std::cell::Cell;
use std::rc::Rc;

fn fib() -> Generator<'static, u64> {
    Generator::new(|co| async move {
        let (mut a, mut b) = (0u64, 1u64);
        loop {
            co.yield_(a).await;
            let Some(next) = a.checked_add(b) else { break };
            (a, b) = (b, next);
        }
    })
}

#[allow(unreachable_code)]
fn naturals() -> Generator<'static, u64> {
    Generator::new(|co| async move {
        let mut n = 0;
        loop {
            co.yield_(n).await;
            n += 1;
        }
        ()
    })
}

fn range(from: u32, to: u32) -> Generator<'static, u32> {
    Generator::new(move |co| async move {
        for n in from..to {
            co.yield_(n).await;
        }
    })
}

/// Test that every yielded value arrives once and in order
#[test]
fn test_yields_arrive_in_order() {
    let values: Vec<u32> = range(0, 50).collect();
    assert_eq!(values, (0..50).collect::<Vec<_>>());
}

/// Test that an infinite body only runs as far as it is pulled
#[test]
fn test_infinite_body_is_lazy() {
    let first: Vec<u64> = fib().take(10).collect();
    assert_eq!(first, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
}

/// Test that a loop with an exit ends the sequence where the exit is taken
#[test]
fn test_fib_stops_before_overflow() {
    let all: Vec<u64> = fib().collect();
    assert_eq!(all.len(), 93);
    assert_eq!(all.last(), Some(&7_540_113_804_746_346_429));
}

/// Test that a body which never returns still yields on demand
#[test]
fn test_endless_body_with_unit_tail() {
    let mut gen = naturals();
    assert_eq!(gen.by_ref().take(3).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(gen.next(), Some(3));
    assert!(!gen.is_finished());
}

/// Test that the body does not run past the element the consumer stopped at
#[test]
fn test_body_runs_only_on_demand() {
    let steps = Rc::new(Cell::new(0));
    let counter = steps.clone();
    let mut gen: Generator<'static, u8> = Generator::new(move |co| async move {
        for n in 0..3 {
            counter.set(counter.get() + 1);
            co.yield_(n).await;
        }
    });

    assert_eq!(steps.get(), 0);
    assert_eq!(gen.next(), Some(0));
    assert_eq!(steps.get(), 1);
    assert_eq!(gen.next(), Some(1));
    assert_eq!(steps.get(), 2);
}

/// Test that an empty body ends the cursor immediately
#[test]
fn test_empty_body_begins_at_end() {
    let mut gen = range(3, 3);
    let cursor = gen.begin().unwrap();
    assert!(cursor.is_end());
}

/// Test that the cursor reaches the end after exactly N elements
#[test]
fn test_cursor_reaches_end_after_n_elements() {
    let mut gen = range(0, 4);
    let mut cursor = gen.begin().unwrap();
    let mut seen = Vec::new();
    while !cursor.is_end() {
        seen.push(*cursor.get());
        cursor.advance().unwrap();
    }
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

/// Test that the streamer lends every element then stays at the end
#[test]
fn test_streamer_lends_each_element() {
    let mut gen = range(10, 13);
    let mut cursor = gen.begin().unwrap();
    let mut seen = Vec::new();
    while let Some(item) = cursor.next() {
        seen.push(*item.unwrap());
    }
    assert_eq!(seen, vec![10, 11, 12]);
    assert!(cursor.next().is_none());
}

/// Test that a zip of two generators is itself a generator
#[test]
fn test_zip_of_generators() {
    fn zip(
        mut left: Generator<'static, u32>,
        mut right: Generator<'static, u64>,
    ) -> Generator<'static, (u32, u64)> {
        Generator::new(move |co| async move {
            while let (Some(l), Some(r)) = (left.next(), right.next()) {
                co.yield_((l, r)).await;
            }
        })
    }

    let pairs: Vec<_> = zip(range(0, 4), fib()).collect();
    assert_eq!(pairs, vec![(0, 0), (1, 1), (2, 1), (3, 2)]);
}

/// Test that generators can borrow data with a non-static lifetime
#[test]
fn test_borrowed_source() {
    fn lengths<'w>(words: &'w [&'w str]) -> Generator<'w, usize> {
        Generator::new(move |co| async move {
            for word in words {
                co.yield_(word.len()).await;
            }
        })
    }

    let words = vec!["pull", "based", "generators"];
    let sizes: Vec<usize> = lengths(&words).collect();
    assert_eq!(sizes, vec![4, 5, 10]);
}

/// Test that a moved-from handle is null and the new owner continues
#[test]
fn test_take_moves_ownership_mid_sequence() {
    let mut gen = range(0, 5);
    assert_eq!(gen.next(), Some(0));
    let mut moved = std::mem::take(&mut gen);
    assert!(gen.is_null());
    assert_eq!(gen.next(), None);
    assert_eq!(moved.next(), Some(1));
    assert_eq!(moved.collect::<Vec<_>>(), vec![2, 3, 4]);
}

/// Test that `take_handle` hands a partly consumed generator to a new owner
#[test]
fn test_take_handle_mid_sequence() {
    let mut gen = range(10, 13);
    assert_eq!(gen.next(), Some(10));
    let moved = gen.take_handle();
    assert!(gen.is_null());
    assert_eq!(moved.collect::<Vec<_>>(), vec![11, 12]);
}

/// Test that a yield handle used in another generator is rejected
#[test]
#[should_panic(expected = "different generator")]
fn test_yield_handle_is_bound_to_its_generator() {
    let mut outer: Generator<'static, u8> = Generator::new(|outer_co| async move {
        let mut inner: Generator<'static, u8> = Generator::new(move |_inner_co| async move {
            outer_co.yield_(1).await;
        });
        let _ = inner.next();
    });
    let _ = outer.next();
}
