//! Single-writer, multi-reader byte ring carrying variable-length records.
//!
//! Records are stored back to back as an 8-byte header followed by the payload,
//! padded to [`RECORD_ALIGN`]. The header holds the payload length and the low
//! 32 bits of the record's start cursor, which lets the ring tell a record
//! boundary apart from an arbitrary position. Cursors are absolute byte
//! offsets that only grow; the physical offset is `cursor & (capacity - 1)`,
//! so a record may straddle the end of storage.
//!
//! The producer evicts whole records from the oldest end when a new record
//! does not fit. Readers holding a cursor into evicted data are told so and
//! handed the oldest surviving record position instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use bitflags::bitflags;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::wait::{WaitResult, WaiterList};
use crate::{TransportError, TransportResult};

/// Size of the per-record header (payload length + start tag).
pub const RECORD_HEADER_LEN: usize = 8;
/// Alignment every record start is padded to.
pub const RECORD_ALIGN: usize = 8;
/// Smallest accepted ring capacity in bytes.
pub const MIN_CAPACITY: usize = 64;

bitflags! {
    /// Flags accepted by [`LogRing::get`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct GetFlags: u32 {
        /// Never suspend; report [`GetStatus::WouldBlock`] when nothing is available.
        const NO_WAIT = 1 << 0;
        /// Return after the first record regardless of the watermark.
        const ONE_RECORD = 1 << 1;
    }
}

/// Outcome of a single [`LogRing::dequeue_at`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dequeue {
    /// Whether a record was copied.
    pub found: bool,
    /// Start of the record that was read, or the position the caller should
    /// resume from when `found` is false.
    pub record_start: u64,
    /// Cursor just past the record that was read.
    pub next_cursor: u64,
    /// Number of bytes copied into the destination.
    pub actual_len: usize,
    /// Whether the record was longer than the destination.
    pub truncated: bool,
}

impl Dequeue {
    fn missing(record_start: u64) -> Self {
        Self {
            found: false,
            record_start,
            next_cursor: record_start,
            actual_len: 0,
            truncated: false,
        }
    }
}

/// Parameters of a bulk read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetRequest {
    pub cursor: u64,
    pub max_len: usize,
    pub flags: GetFlags,
    /// Once at least this many bytes were read the call stops waiting for more.
    pub watermark: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GetStatus {
    Success,
    WouldBlock,
}

/// Result of a bulk read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetResult {
    pub status: GetStatus,
    pub data: Vec<u8>,
    /// Start of the first record returned (differs from the requested cursor
    /// when data was missed).
    pub effective_start: u64,
    /// Cursor to pass to the next call.
    pub next_cursor: u64,
    /// Records between the requested cursor and `effective_start` were evicted.
    pub missed: bool,
    /// The first record did not fit and was cut short.
    pub truncated: bool,
}

struct RingState {
    storage: Box<[u8]>,
    /// Start of the oldest surviving record.
    tail: u64,
    /// Write cursor.
    head: u64,
}

impl RingState {
    fn header(&self, mask: u64, cursor: u64) -> (usize, u32) {
        let at = (cursor & mask) as usize;
        let mut len = [0u8; 4];
        let mut tag = [0u8; 4];
        len.copy_from_slice(&self.storage[at..at + 4]);
        tag.copy_from_slice(&self.storage[at + 4..at + 8]);
        (u32::from_le_bytes(len) as usize, u32::from_le_bytes(tag))
    }

    fn is_boundary(&self, mask: u64, cursor: u64) -> bool {
        if cursor % RECORD_ALIGN as u64 != 0 {
            return false;
        }
        let (len, tag) = self.header(mask, cursor);
        tag == cursor as u32 && cursor + padded_len(len) <= self.head
    }

    /// First record start at or after `cursor`, walking from the tail.
    fn next_boundary(&self, mask: u64, cursor: u64) -> u64 {
        let mut at = self.tail;
        while at < self.head && at < cursor {
            let (len, _) = self.header(mask, at);
            at += padded_len(len);
        }
        at
    }

    fn copy_out(&self, mask: u64, from: u64, dest: &mut [u8]) {
        let at = (from & mask) as usize;
        let first = dest.len().min(self.storage.len() - at);
        dest[..first].copy_from_slice(&self.storage[at..at + first]);
        let rest = dest.len() - first;
        dest[first..].copy_from_slice(&self.storage[..rest]);
    }

    fn copy_in(&mut self, mask: u64, to: u64, src: &[u8]) {
        let at = (to & mask) as usize;
        let first = src.len().min(self.storage.len() - at);
        self.storage[at..at + first].copy_from_slice(&src[..first]);
        let rest = src.len() - first;
        self.storage[..rest].copy_from_slice(&src[first..]);
    }
}

/// Append-only record ring with eviction of the oldest data.
///
/// Only one task may append at a time; appends are serialized by an internal
/// write lock, and readers never block each other.
pub struct LogRing {
    state: RwLock<RingState>,
    head: AtomicU64,
    waiters: WaiterList,
    mask: u64,
}

impl LogRing {
    /// Creates a ring of `capacity` bytes, which must be a power of two of at
    /// least [`MIN_CAPACITY`].
    pub fn new(capacity: usize) -> TransportResult<Self> {
        if capacity < MIN_CAPACITY || !capacity.is_power_of_two() {
            return Err(TransportError::InvalidCapacity {
                requested: capacity,
                minimum: MIN_CAPACITY,
            });
        }
        Ok(Self {
            state: RwLock::new(RingState {
                storage: vec![0u8; capacity].into_boxed_slice(),
                tail: 0,
                head: 0,
            }),
            head: AtomicU64::new(0),
            waiters: WaiterList::new(),
            mask: capacity as u64 - 1,
        })
    }

    pub fn capacity(&self) -> usize {
        self.mask as usize + 1
    }

    /// Largest payload stored without truncation.
    pub fn max_record_len(&self) -> usize {
        self.capacity() - RECORD_HEADER_LEN
    }

    /// Current write cursor.
    pub fn write_cursor(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    /// Start of the oldest record still held by the ring.
    pub fn oldest_cursor(&self) -> u64 {
        self.state.read().tail
    }

    /// Number of readers currently suspended in [`LogRing::wait`].
    pub fn waiting_readers(&self) -> usize {
        self.waiters.len()
    }

    /// Appends one record, evicting the oldest records as needed.
    ///
    /// Empty records are ignored. Payloads longer than
    /// [`LogRing::max_record_len`] are cut to fit.
    pub fn append(&self, record: &[u8]) {
        if record.is_empty() {
            return;
        }
        let max = self.max_record_len();
        let payload = &record[..record.len().min(max)];
        let stored = padded_len(payload.len());

        let (head, evicted) = {
            let mut state = self.state.write();
            let mut evicted = 0usize;
            while state.head + stored - state.tail > self.capacity() as u64 {
                let (len, _) = state.header(self.mask, state.tail);
                state.tail += padded_len(len);
                evicted += 1;
            }

            let start = state.head;
            let mut header = [0u8; RECORD_HEADER_LEN];
            header[..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
            header[4..].copy_from_slice(&(start as u32).to_le_bytes());
            state.copy_in(self.mask, start, &header);
            state.copy_in(self.mask, start + RECORD_HEADER_LEN as u64, payload);

            state.head = start + stored;
            self.head.store(state.head, Ordering::Release);
            (state.head, evicted)
        };

        if payload.len() < record.len() {
            warn!(
                len = record.len(),
                max, "ring record exceeds capacity; truncating"
            );
        }
        if evicted > 0 {
            debug!(evicted, head, "ring evicted oldest records");
        }
        self.waiters.wake_passed(head);
    }

    /// Copies the record at `cursor` into `dest`, cutting it to `dest.len()`.
    ///
    /// When `cursor` points into evicted data (or between record boundaries)
    /// the result has `found == false` and `record_start` set to the next
    /// record the caller should resume from. A cursor at or past the write
    /// cursor also yields `found == false`, with `record_start` clamped to
    /// the write cursor.
    pub fn dequeue_at(&self, cursor: u64, dest: &mut [u8]) -> Dequeue {
        let result = self.read_record(cursor, dest);
        if result.truncated {
            info!(
                cursor = result.record_start,
                copied = result.actual_len,
                "ring truncates a record"
            );
        }
        result
    }

    fn read_record(&self, cursor: u64, dest: &mut [u8]) -> Dequeue {
        let state = self.state.read();
        if cursor < state.tail {
            return Dequeue::missing(state.tail);
        }
        if cursor >= state.head {
            return Dequeue::missing(state.head);
        }
        if !state.is_boundary(self.mask, cursor) {
            return Dequeue::missing(state.next_boundary(self.mask, cursor));
        }

        let (len, _) = state.header(self.mask, cursor);
        let copied = len.min(dest.len());
        state.copy_out(
            self.mask,
            cursor + RECORD_HEADER_LEN as u64,
            &mut dest[..copied],
        );
        Dequeue {
            found: true,
            record_start: cursor,
            next_cursor: cursor + padded_len(len),
            actual_len: copied,
            truncated: copied < len,
        }
    }

    /// Resolves once the write cursor has moved past `cursor`.
    ///
    /// Dropping the future before it resolves withdraws the registration.
    pub fn wait(&self, cursor: u64) -> WaitFor<'_> {
        WaitFor {
            ring: self,
            cursor,
            key: None,
        }
    }

    /// Bulk read: gathers consecutive records starting at `request.cursor`.
    ///
    /// The first record is awaited (unless [`GetFlags::NO_WAIT`]). A cursor
    /// behind the oldest record is moved forward and reported through
    /// `missed`; a cursor inside a live record is realigned silently. A
    /// zero-length read copies nothing and only reports readiness. Further records
    /// are appended while they fit, stopping at a discontinuity or, once the
    /// ring is drained, when the watermark is met. A later record that does
    /// not fit is left for the next call.
    pub async fn get(&self, request: GetRequest) -> GetResult {
        let GetRequest {
            mut cursor,
            max_len,
            flags,
            watermark,
        } = request;
        if max_len == 0 {
            let readable = cursor < self.write_cursor();
            return GetResult {
                status: if readable || !flags.contains(GetFlags::NO_WAIT) {
                    GetStatus::Success
                } else {
                    GetStatus::WouldBlock
                },
                data: Vec::new(),
                effective_start: cursor,
                next_cursor: cursor,
                missed: false,
                truncated: false,
            };
        }

        let mut data = vec![0u8; max_len];
        let mut missed = false;
        let first = loop {
            let read = self.dequeue_at(cursor, &mut data);
            if read.found {
                break read;
            }
            if read.record_start != cursor {
                missed |= cursor < self.oldest_cursor();
                cursor = read.record_start;
                continue;
            }
            if flags.contains(GetFlags::NO_WAIT) {
                return GetResult {
                    status: GetStatus::WouldBlock,
                    data: Vec::new(),
                    effective_start: cursor,
                    next_cursor: cursor,
                    missed,
                    truncated: false,
                };
            }
            self.wait(cursor).await;
        };

        let effective_start = first.record_start;
        let mut progress = first.actual_len;
        cursor = first.next_cursor;

        if !flags.contains(GetFlags::ONE_RECORD) {
            while progress < max_len {
                let read = self.read_record(cursor, &mut data[progress..]);
                if read.found {
                    if read.truncated {
                        break;
                    }
                    progress += read.actual_len;
                    cursor = read.next_cursor;
                    continue;
                }
                if read.record_start != cursor {
                    debug!(cursor, resume = read.record_start, "ring reader fell behind");
                    break;
                }
                if progress >= watermark || flags.contains(GetFlags::NO_WAIT) {
                    break;
                }
                self.wait(cursor).await;
            }
        }

        data.truncate(progress);
        GetResult {
            status: GetStatus::Success,
            data,
            effective_start,
            next_cursor: cursor,
            missed,
            truncated: first.truncated,
        }
    }
}

impl std::fmt::Debug for LogRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("LogRing")
            .field("capacity", &self.capacity())
            .field("tail", &state.tail)
            .field("head", &state.head)
            .finish()
    }
}

/// Future returned by [`LogRing::wait`].
#[must_use = "futures do nothing unless polled"]
pub struct WaitFor<'a> {
    ring: &'a LogRing,
    cursor: u64,
    key: Option<u64>,
}

impl Future for WaitFor<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let ring = this.ring;
        match ring
            .waiters
            .park(this.key, this.cursor, cx.waker(), || ring.write_cursor())
        {
            WaitResult::Ready => {
                this.key = None;
                Poll::Ready(())
            }
            WaitResult::Parked(key) => {
                this.key = Some(key);
                Poll::Pending
            }
        }
    }
}

impl Drop for WaitFor<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.ring.waiters.cancel(key);
        }
    }
}

/// Bytes a record with `len` payload bytes occupies in the ring.
pub fn padded_len(len: usize) -> u64 {
    let total = RECORD_HEADER_LEN + len;
    ((total + RECORD_ALIGN - 1) & !(RECORD_ALIGN - 1)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::task::noop_waker;

    fn read(ring: &LogRing, cursor: u64, max: usize) -> (Dequeue, Vec<u8>) {
        let mut buf = vec![0u8; max];
        let out = ring.dequeue_at(cursor, &mut buf);
        buf.truncate(out.actual_len);
        (out, buf)
    }

    #[test]
    fn rejects_bad_capacity() {
        assert!(LogRing::new(32).is_err());
        assert!(LogRing::new(100).is_err());
        assert!(LogRing::new(128).is_ok());
    }

    #[test]
    fn reads_records_in_order() {
        let ring = LogRing::new(256).unwrap();
        ring.append(b"A");
        ring.append(b"BB");

        let (first, data) = read(&ring, 0, 16);
        assert!(first.found);
        assert_eq!(first.actual_len, 1);
        assert_eq!(data, b"A");
        assert_eq!(first.next_cursor, padded_len(1));

        let (second, data) = read(&ring, first.next_cursor, 16);
        assert!(second.found);
        assert_eq!(data, b"BB");
        assert_eq!(second.next_cursor, ring.write_cursor());
    }

    #[test]
    fn empty_append_is_ignored() {
        let ring = LogRing::new(64).unwrap();
        ring.append(&[]);
        assert_eq!(ring.write_cursor(), 0);
        let (out, _) = read(&ring, 0, 8);
        assert!(!out.found);
    }

    #[test]
    fn truncates_into_small_destination() {
        let ring = LogRing::new(128).unwrap();
        ring.append(b"hello world");
        let (out, data) = read(&ring, 0, 5);
        assert!(out.found);
        assert!(out.truncated);
        assert_eq!(out.actual_len, 5);
        assert_eq!(data, b"hello");
        assert_eq!(out.next_cursor, padded_len(11));
    }

    #[test]
    fn evicted_cursor_reports_resume_point() {
        let ring = LogRing::new(64).unwrap();
        for i in 0..10u8 {
            ring.append(&[i; 12]);
        }
        let oldest = ring.oldest_cursor();
        assert!(oldest > 0);

        let (out, _) = read(&ring, 0, 32);
        assert!(!out.found);
        assert_eq!(out.record_start, oldest);

        let (out, data) = read(&ring, oldest, 32);
        assert!(out.found);
        assert_eq!(data.len(), 12);
    }

    #[test]
    fn record_straddling_the_end_reads_back_whole() {
        let ring = LogRing::new(64).unwrap();
        ring.append(&[1u8; 40]);
        let payload: Vec<u8> = (0..30).collect();
        ring.append(&payload);
        let start = padded_len(40);
        let (out, data) = read(&ring, start, 64);
        assert!(out.found);
        assert_eq!(data, payload);
    }

    #[test]
    fn oversized_record_is_cut_to_capacity() {
        let ring = LogRing::new(64).unwrap();
        ring.append(&[7u8; 200]);
        let (out, data) = read(&ring, 0, 256);
        assert!(out.found);
        assert_eq!(data.len(), ring.max_record_len());
        assert_eq!(ring.write_cursor(), 64);
    }

    #[test]
    fn future_and_misaligned_cursors_are_corrected() {
        let ring = LogRing::new(128).unwrap();
        ring.append(b"abc");
        ring.append(b"def");

        let (out, _) = read(&ring, 1_000, 8);
        assert!(!out.found);
        assert_eq!(out.record_start, ring.write_cursor());

        let (out, _) = read(&ring, 3, 8);
        assert!(!out.found);
        assert_eq!(out.record_start, padded_len(3));
    }

    #[test]
    fn wait_resolves_after_append() {
        let ring = LogRing::new(64).unwrap();
        let mut wait = Box::pin(ring.wait(0));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(wait.as_mut().poll(&mut cx).is_pending());
        assert_eq!(ring.waiting_readers(), 1);

        ring.append(b"x");
        assert!(wait.as_mut().poll(&mut cx).is_ready());
        assert_eq!(ring.waiting_readers(), 0);
    }

    #[test]
    fn dropped_wait_leaves_no_registration() {
        let ring = LogRing::new(64).unwrap();
        {
            let mut wait = Box::pin(ring.wait(0));
            let waker = noop_waker();
            let mut cx = Context::from_waker(&waker);
            assert!(wait.as_mut().poll(&mut cx).is_pending());
            assert_eq!(ring.waiting_readers(), 1);
        }
        assert_eq!(ring.waiting_readers(), 0);
    }

    #[test]
    fn get_with_zero_length_returns_immediately() {
        let ring = LogRing::new(64).unwrap();
        let out = block_on(ring.get(GetRequest {
            cursor: 0,
            max_len: 0,
            ..GetRequest::default()
        }));
        assert_eq!(out.status, GetStatus::Success);
        assert!(out.data.is_empty());
    }

    #[test]
    fn zero_length_no_wait_read_of_drained_ring_would_block() {
        let ring = LogRing::new(64).unwrap();
        let drained = block_on(ring.get(GetRequest {
            cursor: 0,
            max_len: 0,
            flags: GetFlags::NO_WAIT,
            ..GetRequest::default()
        }));
        assert_eq!(drained.status, GetStatus::WouldBlock);
        assert_eq!(drained.next_cursor, 0);

        ring.append(b"x");
        let pending = block_on(ring.get(GetRequest {
            cursor: 0,
            max_len: 0,
            flags: GetFlags::NO_WAIT,
            ..GetRequest::default()
        }));
        assert_eq!(pending.status, GetStatus::Success);
        assert!(pending.data.is_empty());
        assert_eq!(pending.next_cursor, 0);
    }
}
