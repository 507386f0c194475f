#![allow(missing_docs)]

mod codec;
mod descriptor;
mod error;
mod exchange;
mod lane;
mod message;
mod runtime;

pub use codec::Codec;
pub use descriptor::{Capability, Descriptor, IrqLine, MemoryRegion};
pub use error::{FabricError, FabricResult};
pub use exchange::{call, Descriptors, Exchange, Incoming, Reply, Response};
pub use lane::{listener, Connector, Lane, LaneError, LaneResult, Listener};
pub use message::{Message, Preamble, PREAMBLE_LEN};
pub use runtime::Runtime;
