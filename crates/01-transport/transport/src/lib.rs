//! Core in-memory transport primitives.
//!
//! * [`LogRing`] – single-writer, multi-reader record ring with eviction of
//!   the oldest data, resumable cursors and blocking bulk reads.
//! * [`Doorbell`] – coalescing wake signal used by run-loops to learn that
//!   new work may be queued.
//! * [`TransportError`] – configuration failures (bad ring capacity).

mod doorbell;
mod error;
mod ring;
mod wait;

pub use doorbell::{Doorbell, Ring, Rung};
pub use error::{TransportError, TransportResult};
pub use ring::{
    padded_len, Dequeue, GetFlags, GetRequest, GetResult, GetStatus, LogRing, WaitFor,
    MIN_CAPACITY, RECORD_ALIGN, RECORD_HEADER_LEN,
};
