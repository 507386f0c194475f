//! In-process lanes: ordered, reliable, point-to-point endpoints.
//!
//! A lane carries three kinds of items: byte frames, capability descriptors
//! and offered sub-lanes. Receiving requires `&mut Lane`, so only the owner
//! of an endpoint can consume what arrives on it. Dropping an endpoint ends
//! the lane for its peer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use thiserror::Error;
use tracing::trace;

use crate::descriptor::{Capability, Descriptor};

static NEXT_LANE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LaneError {
    #[error("end of lane")]
    EndOfLane,

    #[error("expected {expected} on lane, received {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
}

pub type LaneResult<T> = Result<T, LaneError>;

enum Item {
    Bytes(Vec<u8>),
    Descriptor(Capability),
    Offer(Lane),
}

impl Item {
    fn name(&self) -> &'static str {
        match self {
            Item::Bytes(_) => "bytes",
            Item::Descriptor(_) => "descriptor",
            Item::Offer(_) => "offer",
        }
    }
}

/// One endpoint of a bidirectional lane.
pub struct Lane {
    id: u64,
    tx: UnboundedSender<Item>,
    rx: UnboundedReceiver<Item>,
}

impl Lane {
    /// Creates two connected endpoints.
    pub fn pair() -> (Lane, Lane) {
        let (a_tx, b_rx) = mpsc::unbounded();
        let (b_tx, a_rx) = mpsc::unbounded();
        let id = NEXT_LANE_ID.fetch_add(1, Ordering::Relaxed);
        (
            Lane {
                id,
                tx: a_tx,
                rx: a_rx,
            },
            Lane {
                id,
                tx: b_tx,
                rx: b_rx,
            },
        )
    }

    /// Identifier shared by both endpoints, for diagnostics.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Hands a fresh sub-lane to the peer and returns the local end.
    pub fn offer(&self) -> LaneResult<Lane> {
        let (local, remote) = Lane::pair();
        trace!(lane = self.id, sub_lane = local.id, "offer");
        self.push(Item::Offer(remote))?;
        Ok(local)
    }

    /// Waits for the peer to offer a sub-lane.
    pub async fn accept(&mut self) -> LaneResult<Lane> {
        match self.next("offer").await? {
            Item::Offer(lane) => {
                trace!(lane = self.id, sub_lane = lane.id, "accept");
                Ok(lane)
            }
            other => Err(mismatch("offer", &other)),
        }
    }

    pub fn send_bytes(&self, bytes: Vec<u8>) -> LaneResult<()> {
        self.push(Item::Bytes(bytes))
    }

    pub async fn recv_bytes(&mut self) -> LaneResult<Vec<u8>> {
        match self.next("bytes").await? {
            Item::Bytes(bytes) => Ok(bytes),
            other => Err(mismatch("bytes", &other)),
        }
    }

    /// Transfers a capability to the peer. The sender gives up ownership.
    pub fn push_descriptor(&self, capability: Capability) -> LaneResult<()> {
        self.push(Item::Descriptor(capability))
    }

    pub async fn pull_descriptor(&mut self) -> LaneResult<Descriptor> {
        match self.next("descriptor").await? {
            Item::Descriptor(capability) => Ok(Descriptor::received(capability)),
            other => Err(mismatch("descriptor", &other)),
        }
    }

    fn push(&self, item: Item) -> LaneResult<()> {
        self.tx
            .unbounded_send(item)
            .map_err(|_| LaneError::EndOfLane)
    }

    async fn next(&mut self, expected: &'static str) -> LaneResult<Item> {
        match self.rx.next().await {
            Some(item) => Ok(item),
            None => {
                trace!(lane = self.id, expected, "end of lane");
                Err(LaneError::EndOfLane)
            }
        }
    }
}

fn mismatch(expected: &'static str, found: &Item) -> LaneError {
    LaneError::Mismatch {
        expected,
        found: found.name(),
    }
}

impl fmt::Debug for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lane").field("id", &self.id).finish()
    }
}

/// Creates a bound service endpoint: connections made through the
/// [`Connector`] arrive at the [`Listener`].
pub fn listener() -> (Connector, Listener) {
    let (tx, rx) = mpsc::unbounded();
    (Connector { tx }, Listener { rx })
}

/// Client-side handle for opening connections to a bound service.
#[derive(Clone)]
pub struct Connector {
    tx: UnboundedSender<Lane>,
}

impl Connector {
    pub fn connect(&self) -> LaneResult<Lane> {
        let (client, server) = Lane::pair();
        self.tx
            .unbounded_send(server)
            .map_err(|_| LaneError::EndOfLane)?;
        Ok(client)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector").finish_non_exhaustive()
    }
}

/// Server-side stream of incoming connections.
pub struct Listener {
    rx: UnboundedReceiver<Lane>,
}

impl Listener {
    /// Next incoming connection, or `None` once every connector is gone.
    pub async fn next(&mut self) -> Option<Lane> {
        self.rx.next().await
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::IrqLine;
    use futures::executor::block_on;

    #[test]
    fn bytes_arrive_in_order() {
        let (a, mut b) = Lane::pair();
        a.send_bytes(vec![1]).unwrap();
        a.send_bytes(vec![2, 3]).unwrap();
        block_on(async {
            assert_eq!(b.recv_bytes().await.unwrap(), vec![1]);
            assert_eq!(b.recv_bytes().await.unwrap(), vec![2, 3]);
        });
    }

    #[test]
    fn dropped_peer_ends_lane() {
        let (a, mut b) = Lane::pair();
        a.send_bytes(vec![9]).unwrap();
        drop(a);
        block_on(async {
            assert_eq!(b.recv_bytes().await.unwrap(), vec![9]);
            assert_eq!(b.recv_bytes().await, Err(LaneError::EndOfLane));
        });
        assert_eq!(b.send_bytes(vec![1]), Err(LaneError::EndOfLane));
    }

    #[test]
    fn offered_sub_lane_is_connected() {
        let (a, mut b) = Lane::pair();
        let local = a.offer().unwrap();
        block_on(async {
            let mut remote = b.accept().await.unwrap();
            local.send_bytes(b"ping".to_vec()).unwrap();
            assert_eq!(remote.recv_bytes().await.unwrap(), b"ping");
            assert_eq!(remote.id(), local.id());
        });
    }

    #[test]
    fn wrong_item_kind_is_a_mismatch() {
        let (a, mut b) = Lane::pair();
        a.push_descriptor(Capability::Irq(IrqLine { line: 3 }))
            .unwrap();
        let err = block_on(b.recv_bytes()).unwrap_err();
        assert_eq!(
            err,
            LaneError::Mismatch {
                expected: "bytes",
                found: "descriptor"
            }
        );
    }

    #[test]
    fn listener_receives_connections() {
        let (connector, mut listener) = listener();
        let client = connector.connect().unwrap();
        block_on(async {
            let mut server = listener.next().await.unwrap();
            client.send_bytes(vec![7]).unwrap();
            assert_eq!(server.recv_bytes().await.unwrap(), vec![7]);
            drop(connector);
            assert!(listener.next().await.is_none());
        });
    }
}
