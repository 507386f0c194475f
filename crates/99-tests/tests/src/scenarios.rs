//! Behaviour checked end to end, one scenario per test.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;

use futures::executor::{block_on, LocalPool};
use futures::task::LocalSpawnExt;
use service_abi::{KerncfgResponse, Status};
use services_block::{BlockQueue, DiskConfig, MemoryDisk};
use services_fabric::KerncfgClient;
use services_kerncfg::{Kerncfg, KerncfgConfig};
use transport::{Doorbell, GetFlags, GetRequest, LogRing, Ring};
use transport_codecs::KerncfgCodec;
use transport_fabric::{call, Codec, Message};

#[test]
fn consecutive_records_are_read_one_at_a_time() {
    let ring = LogRing::new(256).unwrap();
    ring.append(b"A");
    ring.append(b"BB");

    let mut dest = [0u8; 16];
    let first = ring.dequeue_at(0, &mut dest);
    assert!(first.found);
    assert_eq!(first.actual_len, 1);
    assert_eq!(&dest[..1], b"A");
    assert!(!first.truncated);

    let second = ring.dequeue_at(first.next_cursor, &mut dest);
    assert!(second.found);
    assert_eq!(&dest[..second.actual_len], b"BB");
    assert_eq!(second.next_cursor, ring.write_cursor());
}

#[test]
fn evicted_cursor_is_corrected_forward() {
    let ring = LogRing::new(64).unwrap();
    for record in [&b"one"[..], b"two", b"three", b"four", b"five"] {
        ring.append(record);
    }
    let mut dest = [0u8; 16];
    let stale = ring.dequeue_at(0, &mut dest);
    assert!(!stale.found);
    assert!(stale.record_start > 0);
    assert_eq!(stale.record_start, ring.oldest_cursor());

    let resumed = ring.dequeue_at(stale.record_start, &mut dest);
    assert!(resumed.found);
    assert_eq!(&dest[..resumed.actual_len], b"two");
}

#[test]
fn short_buffer_truncates_record() {
    let ring = LogRing::new(64).unwrap();
    ring.append(b"truncate me");
    let mut dest = [0u8; 4];
    let read = ring.dequeue_at(0, &mut dest);
    assert!(read.found);
    assert!(read.truncated);
    assert_eq!(read.actual_len, 4);
    assert_eq!(&dest, b"trun");
}

#[test]
fn sector_reads_complete_in_order() {
    let mut pool = LocalPool::new();
    let disk = MemoryDisk::new(DiskConfig::default());
    let queue = BlockQueue::start(disk, &pool.spawner()).unwrap();
    pool.run_until(async {
        for sector in [10u64, 20, 30] {
            let data = vec![sector as u8; service_abi::SECTOR_SIZE];
            queue.write_sectors(sector, data).await.unwrap();
        }
    });

    let completed = Rc::new(RefCell::new(Vec::new()));
    for sector in [10u64, 20, 30] {
        let read = queue.read_sectors(sector, 1);
        let completed = Rc::clone(&completed);
        pool.spawner()
            .spawn_local(async move {
                let data = read.await.unwrap();
                assert!(data.iter().all(|byte| *byte == sector as u8));
                completed.borrow_mut().push(sector);
            })
            .unwrap();
    }
    pool.run_until_stalled();
    assert_eq!(*completed.borrow(), vec![10, 20, 30]);
    assert!(!queue.disk().is_busy());
}

#[test]
fn unknown_kind_then_valid_request_on_one_connection() {
    let mut pool = LocalPool::new();
    let config = KerncfgConfig {
        num_cpus: 4,
        ..KerncfgConfig::default()
    };
    let kerncfg = Kerncfg::start(&config, &pool.spawner()).unwrap();
    let lane = kerncfg.connect().unwrap();

    let (illegal, cpus) = pool.run_until(async {
        let reply = call(&lane, &Message::new(0xFFFF, vec![])).await.unwrap();
        let illegal = KerncfgCodec.decode_response(&reply).unwrap();
        let cpus = KerncfgClient::new(lane).num_cpu().await.unwrap();
        (illegal, cpus)
    });
    assert_eq!(illegal, KerncfgResponse::Error(Status::IllegalRequest));
    assert_eq!(cpus, 4);
}

#[test]
fn doorbell_rings_coalesce() {
    let doorbell = Doorbell::new();
    assert_eq!(doorbell.ring(), Ring::Accepted);
    for _ in 0..5 {
        assert_eq!(doorbell.ring(), Ring::Coalesced);
    }
    block_on(doorbell.wait());
    assert!(!doorbell.is_rung());
    assert_eq!(doorbell.ring(), Ring::Accepted);
}

#[test]
fn reader_follows_a_producer_thread() {
    const RECORDS: usize = 200;
    let ring = std::sync::Arc::new(LogRing::new(1 << 16).unwrap());
    let producer = {
        let ring = std::sync::Arc::clone(&ring);
        thread::spawn(move || {
            for n in 0..RECORDS {
                ring.append(format!("{n:04}").as_bytes());
            }
        })
    };

    let mut cursor = 0;
    let mut seen = Vec::new();
    while seen.len() < RECORDS * 4 {
        let out = block_on(ring.get(GetRequest {
            cursor,
            max_len: 256,
            flags: GetFlags::empty(),
            watermark: 0,
        }));
        assert!(!out.missed);
        seen.extend_from_slice(&out.data);
        cursor = out.next_cursor;
    }
    producer.join().unwrap();

    let expected: Vec<u8> = (0..RECORDS)
        .flat_map(|n| format!("{n:04}").into_bytes())
        .collect();
    assert_eq!(seen, expected);
}
