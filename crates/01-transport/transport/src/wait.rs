//! Cursor-keyed waiter list used by ring readers.
//!
//! Each suspended reader parks with the cursor it needs the producer to pass.
//! When the write cursor advances, every waiter whose cursor is now behind it
//! is woken; waiters for positions further ahead stay parked. A waiter that
//! is dropped removes its own entry so cancellation leaves nothing behind.

use std::task::Waker;

use parking_lot::Mutex;
use smallvec::SmallVec;

/// Outcome of registering interest in a cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WaitResult {
    /// The cursor was already passed; the caller should not suspend.
    Ready,
    /// The waker was parked under the returned key.
    Parked(u64),
}

struct Entry {
    key: u64,
    cursor: u64,
    waker: Waker,
}

#[derive(Default)]
struct Waiters {
    next_key: u64,
    entries: Vec<Entry>,
}

/// Registry of readers waiting for the write cursor to move past a position.
#[derive(Default)]
pub(crate) struct WaiterList {
    inner: Mutex<Waiters>,
}

impl WaiterList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parks `waker` until the write cursor exceeds `cursor`.
    ///
    /// `write_cursor` is sampled while the list is locked, which pairs with
    /// [`WaiterList::wake_passed`] taking the same lock after publishing a new
    /// cursor: either this call observes the new value or the producer
    /// observes the entry.
    pub(crate) fn park(
        &self,
        key: Option<u64>,
        cursor: u64,
        waker: &Waker,
        write_cursor: impl FnOnce() -> u64,
    ) -> WaitResult {
        let mut inner = self.inner.lock();
        if write_cursor() > cursor {
            if let Some(key) = key {
                inner.entries.retain(|entry| entry.key != key);
            }
            return WaitResult::Ready;
        }

        if let Some(key) = key {
            if let Some(entry) = inner.entries.iter_mut().find(|entry| entry.key == key) {
                if !entry.waker.will_wake(waker) {
                    entry.waker = waker.clone();
                }
                entry.cursor = cursor;
                return WaitResult::Parked(key);
            }
        }

        let key = inner.next_key;
        inner.next_key += 1;
        inner.entries.push(Entry {
            key,
            cursor,
            waker: waker.clone(),
        });
        WaitResult::Parked(key)
    }

    /// Removes a parked waiter, if it is still registered.
    pub(crate) fn cancel(&self, key: u64) {
        self.inner.lock().entries.retain(|entry| entry.key != key);
    }

    /// Wakes every waiter whose cursor lies behind `write_cursor`.
    ///
    /// Returns the number of woken waiters.
    pub(crate) fn wake_passed(&self, write_cursor: u64) -> usize {
        let woken: SmallVec<[Waker; 8]> = {
            let mut inner = self.inner.lock();
            let mut woken = SmallVec::new();
            inner.entries.retain(|entry| {
                if entry.cursor < write_cursor {
                    woken.push(entry.waker.clone());
                    false
                } else {
                    true
                }
            });
            woken
        };

        let count = woken.len();
        for waker in woken {
            waker.wake();
        }
        count
    }

    /// Number of parked waiters.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}
