//! FIFO of pending device operations drained by a single run-loop.
//!
//! Submitters push an operation and ring the doorbell; the run-loop pops the
//! oldest entry, performs it against the device and resolves the submitter's
//! completion. Exactly one operation is in flight at a time. A completion
//! dropped before the loop claims its entry removes the entry; once claimed,
//! the operation runs to the end.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, trace};
use transport::Doorbell;

/// The single serialized resource behind a [`DeviceQueue`].
pub trait Device {
    type Op;
    type Output;
    type Error: std::error::Error + 'static;

    /// Performs one operation. Only the run-loop calls this, one call at a time.
    fn perform(&self, op: Self::Op) -> impl Future<Output = Result<Self::Output, Self::Error>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError<E: std::error::Error + 'static> {
    #[error("device error: {0}")]
    Device(#[source] E),

    #[error("device queue shut down")]
    Shutdown,
}

type Outcome<D> = Result<<D as Device>::Output, <D as Device>::Error>;

struct Pending<D: Device> {
    id: u64,
    op: D::Op,
    done: oneshot::Sender<Outcome<D>>,
}

struct QueueState<D: Device> {
    next_id: u64,
    pending: VecDeque<Pending<D>>,
    in_flight: Option<u64>,
    closed: bool,
}

struct Shared<D: Device> {
    state: Mutex<QueueState<D>>,
    doorbell: Doorbell,
}

impl<D: Device> Shared<D> {
    fn withdraw(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        match state.pending.binary_search_by_key(&id, |entry| entry.id) {
            Ok(at) => {
                state.pending.remove(at);
                true
            }
            Err(_) => false,
        }
    }
}

/// Submission side of a device queue; clones share the same FIFO.
pub struct DeviceQueue<D: Device> {
    shared: Arc<Shared<D>>,
}

impl<D: Device> Clone for DeviceQueue<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: Device> Default for DeviceQueue<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Device> DeviceQueue<D> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    next_id: 0,
                    pending: VecDeque::new(),
                    in_flight: None,
                    closed: false,
                }),
                doorbell: Doorbell::new(),
            }),
        }
    }

    /// Enqueues `op` and wakes the run-loop.
    pub fn submit(&self, op: D::Op) -> Completion<D> {
        let (done, rx) = oneshot::channel();
        let id = {
            let mut state = self.shared.state.lock();
            if state.closed {
                // Dropping `done` resolves the completion as shut down.
                return Completion {
                    id: None,
                    rx,
                    shared: Arc::clone(&self.shared),
                };
            }
            let id = state.next_id;
            state.next_id += 1;
            state.pending.push_back(Pending { id, op, done });
            id
        };
        let ring = self.shared.doorbell.ring();
        trace!(id, ?ring, "device op queued");
        Completion {
            id: Some(id),
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Operations waiting to be claimed by the run-loop.
    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an operation is currently being performed.
    pub fn in_flight(&self) -> bool {
        self.shared.state.lock().in_flight.is_some()
    }

    /// Stops accepting work. Unclaimed operations resolve as
    /// [`QueueError::Shutdown`]; the run-loop returns after the operation in
    /// flight, if any.
    pub fn close(&self) {
        let dropped: Vec<Pending<D>> = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.pending.drain(..).collect()
        };
        debug!(dropped = dropped.len(), "device queue closed");
        drop(dropped);
        self.shared.doorbell.ring();
    }

    /// Drains the queue against `device` until [`DeviceQueue::close`] is called.
    pub async fn run(&self, device: &D) {
        loop {
            let next = {
                let mut state = self.shared.state.lock();
                match state.pending.pop_front() {
                    Some(entry) => {
                        state.in_flight = Some(entry.id);
                        Some(entry)
                    }
                    None if state.closed => return,
                    None => None,
                }
            };

            let Some(Pending { id, op, done }) = next else {
                self.shared.doorbell.wait().await;
                continue;
            };

            trace!(id, "device op started");
            let outcome = device.perform(op).await;
            if let Err(err) = &outcome {
                error!(id, %err, "device operation failed");
            }
            self.shared.state.lock().in_flight = None;
            if done.send(outcome).is_err() {
                debug!(id, "submitter went away before completion");
            }
        }
    }
}

/// Resolves with the outcome of one submitted operation.
///
/// Dropping it before the run-loop claims the operation withdraws the
/// operation from the queue.
#[must_use = "futures do nothing unless polled"]
pub struct Completion<D: Device> {
    id: Option<u64>,
    rx: oneshot::Receiver<Outcome<D>>,
    shared: Arc<Shared<D>>,
}

impl<D: Device> Future for Completion<D> {
    type Output = Result<D::Output, QueueError<D::Error>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(outcome) => {
                this.id = None;
                Poll::Ready(match outcome {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(err)) => Err(QueueError::Device(err)),
                    Err(oneshot::Canceled) => Err(QueueError::Shutdown),
                })
            }
        }
    }
}

impl<D: Device> Drop for Completion<D> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if self.shared.withdraw(id) {
                trace!(id, "device op withdrawn");
            }
        }
    }
}
