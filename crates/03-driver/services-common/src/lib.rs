#![deny(missing_docs)]
//! Shared building blocks for service objects.
//!
//! * [`serve`] / [`serve_connection`] – the per-connection dispatch loop every
//!   object exposed over a lane runs.
//! * [`DeviceQueue`] – FIFO plus doorbell that serializes access to a single
//!   device while any number of callers await their completions.

#[allow(missing_docs)]
mod dispatch;
#[allow(missing_docs)]
mod queue;

pub use dispatch::{
    serve, serve_connection, ConnectionReport, ConnectionState, Handled, ServiceObject,
};
pub use queue::{Completion, Device, DeviceQueue, QueueError};
