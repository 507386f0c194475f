//! Request/response exchanges, one sub-lane per exchange.
//!
//! The client offers a fresh sub-lane on the parent connection and sends the
//! request over it, so unrelated calls sharing the parent never interleave.
//! Responses are received in full (head, then tail) before any descriptor is
//! pulled; a descriptor failure is reported as [`FabricError::Descriptor`].

use smallvec::SmallVec;
use tracing::trace;

use crate::descriptor::{Capability, Descriptor};
use crate::error::{FabricError, FabricResult};
use crate::lane::Lane;
use crate::message::{read_message, write_message, Message};

pub type Descriptors = SmallVec<[Descriptor; 2]>;

/// Client side of one exchange.
#[derive(Debug)]
pub struct Exchange {
    lane: Lane,
}

/// A fully received response.
#[derive(Debug)]
pub struct Response {
    pub message: Message,
    pub descriptors: Descriptors,
}

impl Exchange {
    /// Opens an exchange on `parent` and sends `request` over it.
    pub fn send_request(parent: &Lane, request: &Message) -> FabricResult<Self> {
        let lane = parent.offer()?;
        write_message(&lane, request)?;
        Ok(Self { lane })
    }

    /// Receives the response head and tail.
    pub async fn receive_message(&mut self) -> FabricResult<Message> {
        read_message(&mut self.lane).await
    }

    /// Pulls `count` descriptors attached after the response bytes.
    pub async fn pull_descriptors(&mut self, count: usize) -> FabricResult<Descriptors> {
        let mut out = Descriptors::new();
        for _ in 0..count {
            let descriptor = self
                .lane
                .pull_descriptor()
                .await
                .map_err(FabricError::Descriptor)?;
            out.push(descriptor);
        }
        Ok(out)
    }

    /// Receives the response, then pulls as many descriptors as
    /// `attached(&message)` says the response carries.
    pub async fn receive_response(
        mut self,
        attached: impl FnOnce(&Message) -> usize,
    ) -> FabricResult<Response> {
        let message = self.receive_message().await?;
        let count = attached(&message);
        let descriptors = self.pull_descriptors(count).await?;
        trace!(
            lane = self.lane.id(),
            kind = message.kind,
            descriptors = descriptors.len(),
            "response received"
        );
        Ok(Response {
            message,
            descriptors,
        })
    }
}

/// Sends `request` and waits for a response that carries no descriptors.
pub async fn call(parent: &Lane, request: &Message) -> FabricResult<Message> {
    let mut exchange = Exchange::send_request(parent, request)?;
    exchange.receive_message().await
}

/// Server side of one exchange.
#[derive(Debug)]
pub struct Incoming {
    lane: Lane,
}

/// Response bytes plus the capabilities handed over with them.
#[derive(Debug, Default)]
pub struct Reply {
    pub message: Message,
    pub descriptors: SmallVec<[Capability; 2]>,
}

impl Reply {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            descriptors: SmallVec::new(),
        }
    }

    pub fn with_descriptor(mut self, capability: Capability) -> Self {
        self.descriptors.push(capability);
        self
    }
}

impl From<Message> for Reply {
    fn from(message: Message) -> Self {
        Reply::new(message)
    }
}

impl Incoming {
    /// Waits for the next exchange offered on `connection`.
    pub async fn accept(connection: &mut Lane) -> FabricResult<Self> {
        let lane = connection.accept().await?;
        Ok(Self { lane })
    }

    pub fn id(&self) -> u64 {
        self.lane.id()
    }

    pub async fn recv_request(&mut self) -> FabricResult<Message> {
        read_message(&mut self.lane).await
    }

    /// Sends the reply bytes, then its descriptors, and closes the exchange.
    pub fn send_reply(self, reply: Reply) -> FabricResult<()> {
        write_message(&self.lane, &reply.message)?;
        for capability in reply.descriptors {
            self.lane.push_descriptor(capability)?;
        }
        Ok(())
    }
}
