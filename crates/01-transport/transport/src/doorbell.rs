//! Single-slot, coalescing wake signal.
//!
//! Any number of producers may ring the doorbell; one consumer waits on it.
//! Rings that arrive before the consumer next waits collapse into one, since
//! the only message carried is "check again".

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::task::AtomicWaker;

/// Outcome reported when ringing the doorbell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ring {
    /// The doorbell was idle and is now pending.
    Accepted,
    /// A ring was already pending; this one merged with it.
    Coalesced,
}

#[derive(Debug, Default)]
pub struct Doorbell {
    rung: AtomicBool,
    waker: AtomicWaker,
}

impl Doorbell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ring(&self) -> Ring {
        let previous = self.rung.swap(true, Ordering::AcqRel);
        self.waker.wake();
        if previous {
            Ring::Coalesced
        } else {
            Ring::Accepted
        }
    }

    /// Whether a ring is pending.
    pub fn is_rung(&self) -> bool {
        self.rung.load(Ordering::Acquire)
    }

    /// Resolves once the doorbell has been rung, consuming the pending ring.
    ///
    /// Only one task may wait at a time; a second waiter replaces the first
    /// one's waker.
    pub fn wait(&self) -> Rung<'_> {
        Rung { bell: self }
    }
}

/// Future returned by [`Doorbell::wait`].
#[must_use = "futures do nothing unless polled"]
pub struct Rung<'a> {
    bell: &'a Doorbell,
}

impl Future for Rung<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let bell = self.bell;
        if bell.rung.swap(false, Ordering::AcqRel) {
            return Poll::Ready(());
        }
        bell.waker.register(cx.waker());
        if bell.rung.swap(false, Ordering::AcqRel) {
            return Poll::Ready(());
        }
        Poll::Pending
    }
}
