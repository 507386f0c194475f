//! Ring semantics integration tests.
//! Covers bulk reads (watermark, NO_WAIT, ONE_RECORD, discontinuities),
//! independent wake-up of waiters, and (optionally) property-based checks.

use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::{block_on, LocalPool};
use futures::task::LocalSpawnExt;
use transport::{padded_len, GetFlags, GetRequest, GetStatus, LogRing};

fn request(cursor: u64, max_len: usize) -> GetRequest {
    GetRequest {
        cursor,
        max_len,
        flags: GetFlags::empty(),
        watermark: 0,
    }
}

#[test]
fn bulk_read_concatenates_available_records() {
    let ring = LogRing::new(256).unwrap();
    ring.append(b"one");
    ring.append(b"two");
    ring.append(b"three");

    let out = block_on(ring.get(request(0, 64)));
    assert_eq!(out.status, GetStatus::Success);
    assert_eq!(out.data, b"onetwothree");
    assert_eq!(out.effective_start, 0);
    assert_eq!(out.next_cursor, ring.write_cursor());
    assert!(!out.missed);
    assert!(!out.truncated);
}

#[test]
fn one_record_flag_stops_after_first() {
    let ring = LogRing::new(256).unwrap();
    ring.append(b"one");
    ring.append(b"two");

    let out = block_on(ring.get(GetRequest {
        flags: GetFlags::ONE_RECORD,
        ..request(0, 64)
    }));
    assert_eq!(out.data, b"one");
    assert_eq!(out.next_cursor, padded_len(3));
}

#[test]
fn no_wait_on_empty_ring_would_block() {
    let ring = LogRing::new(64).unwrap();
    let out = block_on(ring.get(GetRequest {
        flags: GetFlags::NO_WAIT,
        ..request(0, 16)
    }));
    assert_eq!(out.status, GetStatus::WouldBlock);
    assert!(out.data.is_empty());
    assert_eq!(out.next_cursor, 0);
}

#[test]
fn record_that_does_not_fit_is_left_for_next_call() {
    let ring = LogRing::new(256).unwrap();
    ring.append(b"abcd");
    ring.append(b"efghijkl");

    let out = block_on(ring.get(request(0, 8)));
    assert_eq!(out.data, b"abcd");
    assert!(!out.truncated);

    let rest = block_on(ring.get(request(out.next_cursor, 8)));
    assert_eq!(rest.data, b"efghijkl");
}

#[test]
fn oversized_first_record_is_truncated_and_consumed() {
    let ring = LogRing::new(256).unwrap();
    ring.append(b"0123456789");
    ring.append(b"next");

    let out = block_on(ring.get(request(0, 4)));
    assert!(out.truncated);
    assert_eq!(out.data, b"0123");
    assert_eq!(out.next_cursor, padded_len(10));
}

#[test]
fn stale_cursor_reports_missed_and_resumes() {
    let ring = LogRing::new(64).unwrap();
    for i in 0..8u8 {
        ring.append(&[b'a' + i; 10]);
    }
    let oldest = ring.oldest_cursor();

    let out = block_on(ring.get(GetRequest {
        flags: GetFlags::ONE_RECORD,
        ..request(0, 32)
    }));
    assert!(out.missed);
    assert_eq!(out.effective_start, oldest);
    assert_eq!(out.data.len(), 10);
}

#[test]
fn cursor_inside_live_record_is_realigned_without_missed() {
    let ring = LogRing::new(256).unwrap();
    ring.append(b"abc");
    ring.append(b"def");

    let out = block_on(ring.get(GetRequest {
        flags: GetFlags::NO_WAIT,
        ..request(3, 64)
    }));
    assert_eq!(out.status, GetStatus::Success);
    assert!(!out.missed);
    assert_eq!(out.effective_start, padded_len(3));
    assert_eq!(out.data, b"def");
}

#[test]
fn watermark_keeps_reader_waiting_for_more() {
    let ring = Rc::new(LogRing::new(256).unwrap());
    ring.append(b"ab");

    let mut pool = LocalPool::new();
    let result = Rc::new(RefCell::new(None));
    {
        let ring = ring.clone();
        let result = result.clone();
        pool.spawner()
            .spawn_local(async move {
                let out = ring
                    .get(GetRequest {
                        watermark: 4,
                        ..request(0, 64)
                    })
                    .await;
                *result.borrow_mut() = Some(out);
            })
            .unwrap();
    }

    pool.run_until_stalled();
    assert!(result.borrow().is_none());
    assert_eq!(ring.waiting_readers(), 1);

    ring.append(b"cd");
    pool.run_until_stalled();
    let out = result.borrow_mut().take().expect("read completes");
    assert_eq!(out.data, b"abcd");
}

#[test]
fn waiters_on_distinct_cursors_release_independently() {
    let ring = Rc::new(LogRing::new(256).unwrap());
    let mut pool = LocalPool::new();
    let released = Rc::new(RefCell::new(Vec::new()));

    let second = padded_len(1);
    for (name, cursor) in [("first", 0u64), ("second", second)] {
        let ring = ring.clone();
        let released = released.clone();
        pool.spawner()
            .spawn_local(async move {
                ring.wait(cursor).await;
                released.borrow_mut().push(name);
            })
            .unwrap();
    }

    pool.run_until_stalled();
    assert_eq!(ring.waiting_readers(), 2);

    ring.append(b"x");
    pool.run_until_stalled();
    assert_eq!(*released.borrow(), vec!["first"]);
    assert_eq!(ring.waiting_readers(), 1);

    ring.append(b"y");
    pool.run_until_stalled();
    assert_eq!(*released.borrow(), vec!["first", "second"]);
    assert_eq!(ring.waiting_readers(), 0);
}

#[test]
fn blocking_read_wakes_on_append() {
    let ring = Rc::new(LogRing::new(128).unwrap());
    let mut pool = LocalPool::new();
    let result = Rc::new(RefCell::new(None));
    {
        let ring = ring.clone();
        let result = result.clone();
        pool.spawner()
            .spawn_local(async move {
                *result.borrow_mut() = Some(ring.get(request(0, 32)).await);
            })
            .unwrap();
    }
    pool.run_until_stalled();
    assert!(result.borrow().is_none());

    ring.append(b"late");
    pool.run_until_stalled();
    let out = result.borrow_mut().take().expect("read completes");
    assert_eq!(out.status, GetStatus::Success);
    assert_eq!(out.data, b"late");
}

#[cfg(feature = "proptest")]
mod prop {
    use super::*;
    use proptest::collection;
    use proptest::prelude::*;

    proptest! {
        /// Without wraparound, draining from cursor 0 returns every appended
        /// byte in order.
        #[test]
        fn drain_returns_appended_concatenation(
            records in collection::vec(collection::vec(any::<u8>(), 1..40), 1..20)
        ) {
            let ring = LogRing::new(4096).unwrap();
            let mut expected = Vec::new();
            for record in &records {
                ring.append(record);
                expected.extend_from_slice(record);
            }

            let mut got = Vec::new();
            let mut cursor = 0u64;
            let mut buf = vec![0u8; 4096];
            loop {
                let out = ring.dequeue_at(cursor, &mut buf);
                if !out.found {
                    break;
                }
                got.extend_from_slice(&buf[..out.actual_len]);
                cursor = out.next_cursor;
            }
            prop_assert_eq!(&got, &expected);

            let bulk = block_on(ring.get(GetRequest {
                flags: GetFlags::NO_WAIT,
                ..request(0, 4096)
            }));
            prop_assert_eq!(bulk.data, expected);
        }

        /// Past wraparound, every read either succeeds at a surviving record or
        /// points forward to one.
        #[test]
        fn stale_reads_never_go_backwards(
            lens in collection::vec(1usize..60, 1..80),
            cursor in 0u64..4096,
        ) {
            let ring = LogRing::new(128).unwrap();
            for (i, len) in lens.iter().enumerate() {
                ring.append(&vec![i as u8; *len]);
            }
            let mut buf = [0u8; 128];
            let out = ring.dequeue_at(cursor, &mut buf);
            if out.found {
                prop_assert!(out.record_start >= ring.oldest_cursor());
                prop_assert!(out.next_cursor <= ring.write_cursor());
            } else if cursor <= ring.write_cursor() {
                prop_assert!(out.record_start >= cursor);
            } else {
                prop_assert_eq!(out.record_start, ring.write_cursor());
            }
        }
    }
}
