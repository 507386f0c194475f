//! Per-object dispatch loop.
//!
//! Each accepted connection runs its own loop: wait for an exchange, decode the
//! request, hand it to the object, reply, repeat. Unknown kinds get the
//! codec's illegal-request response and the loop carries on. A malformed
//! request, or an exchange whose requester went away, ends that exchange
//! only. The connection ends when its own lane closes; other connections to
//! the same object are unaffected.

use std::future::Future;
use std::rc::Rc;

use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};
use transport_fabric::{Capability, Codec, FabricError, Incoming, Lane, Listener, Reply};

/// A response together with the capabilities it hands over.
#[derive(Debug)]
pub struct Handled<R> {
    pub response: R,
    pub descriptors: SmallVec<[Capability; 2]>,
}

impl<R> Handled<R> {
    pub fn new(response: R) -> Self {
        Self {
            response,
            descriptors: SmallVec::new(),
        }
    }

    pub fn with_descriptor(mut self, capability: Capability) -> Self {
        self.descriptors.push(capability);
        self
    }
}

impl<R> From<R> for Handled<R> {
    fn from(response: R) -> Self {
        Handled::new(response)
    }
}

/// An object reachable over lanes.
pub trait ServiceObject: 'static {
    type Codec: Codec;

    fn name(&self) -> &str;
    fn codec(&self) -> &Self::Codec;

    /// Produces the response to one decoded request.
    fn handle(
        &self,
        request: <Self::Codec as Codec>::Request,
    ) -> impl Future<Output = Handled<<Self::Codec as Codec>::Response>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Accepted,
    AwaitingRequest,
    Dispatching,
    Replying,
    Closed,
}

/// What a connection did before it closed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionReport {
    /// Exchanges answered, including illegal-request replies.
    pub exchanges: u64,
    pub illegal_requests: u64,
    pub protocol_violations: u64,
    /// Exchanges whose requester went away before the reply was delivered.
    pub abandoned_exchanges: u64,
}

struct Tracker<'a> {
    object: &'a str,
    lane: u64,
    state: ConnectionState,
}

impl Tracker<'_> {
    fn enter(&mut self, next: ConnectionState) {
        trace!(
            object = self.object,
            lane = self.lane,
            from = ?self.state,
            to = ?next,
            "connection state"
        );
        self.state = next;
    }
}

/// Serves exchanges on `connection` until its lane breaks.
///
/// A failed exchange only drops that exchange; the connection keeps
/// accepting new ones.
pub async fn serve_connection<O: ServiceObject>(
    object: Rc<O>,
    mut connection: Lane,
) -> ConnectionReport {
    let codec = object.codec().clone();
    let mut report = ConnectionReport::default();
    let mut tracker = Tracker {
        object: object.name(),
        lane: connection.id(),
        state: ConnectionState::Idle,
    };
    tracker.enter(ConnectionState::Accepted);

    loop {
        tracker.enter(ConnectionState::AwaitingRequest);
        let mut incoming = match Incoming::accept(&mut connection).await {
            Ok(incoming) => incoming,
            Err(err) => {
                debug!(object = object.name(), %err, "connection ended");
                break;
            }
        };
        let request = match incoming.recv_request().await {
            Ok(request) => request,
            Err(FabricError::ProtocolViolation(reason)) => {
                warn!(object = object.name(), %reason, "protocol violation; dropping exchange");
                report.protocol_violations += 1;
                continue;
            }
            Err(err) => {
                debug!(object = object.name(), %err, "receive failed; dropping exchange");
                report.abandoned_exchanges += 1;
                continue;
            }
        };

        tracker.enter(ConnectionState::Dispatching);
        let handled = match codec.decode_request(&request) {
            Ok(Some(decoded)) => object.handle(decoded).await,
            Ok(None) => {
                debug!(
                    object = object.name(),
                    kind = request.kind,
                    "illegal request"
                );
                report.illegal_requests += 1;
                Handled::new(codec.illegal_request())
            }
            Err(err) => {
                warn!(
                    object = object.name(),
                    kind = request.kind,
                    %err,
                    "protocol violation; dropping exchange"
                );
                report.protocol_violations += 1;
                continue;
            }
        };

        tracker.enter(ConnectionState::Replying);
        let message = match codec.encode_response(&handled.response) {
            Ok(message) => message,
            Err(err) => {
                error!(object = object.name(), %err, "failed to encode response");
                continue;
            }
        };
        let reply = Reply {
            message,
            descriptors: handled.descriptors,
        };
        if let Err(err) = incoming.send_reply(reply) {
            debug!(object = object.name(), %err, "requester gone; dropping reply");
            report.abandoned_exchanges += 1;
            continue;
        }
        report.exchanges += 1;
    }

    tracker.enter(ConnectionState::Closed);
    report
}

/// Accepts connections from `listener` and spawns one loop per connection.
///
/// Returns once every connector for the listener is gone.
pub async fn serve<O: ServiceObject>(object: Rc<O>, mut listener: Listener, spawner: LocalSpawner) {
    while let Some(connection) = listener.next().await {
        trace!(object = object.name(), lane = connection.id(), "incoming connection");
        let task = serve_connection(Rc::clone(&object), connection);
        if let Err(err) = spawner.spawn_local(async move {
            task.await;
        }) {
            error!(object = object.name(), %err, "failed to spawn connection loop");
            return;
        }
    }
}
