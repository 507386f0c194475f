//! Self-describing messages: fixed preamble, inline head, separate tail.
//!
//! On the wire a message is one frame holding `{u32 kind}{u32 tail_len}` in
//! little endian followed by the head bytes, then, when `tail_len > 0`, a
//! second frame holding exactly `tail_len` bytes. The receiver learns the
//! tail size from the preamble before it takes the tail.

use tracing::trace;

use crate::error::{FabricError, FabricResult};
use crate::lane::{Lane, LaneError};

pub const PREAMBLE_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preamble {
    pub kind: u32,
    pub tail_len: u32,
}

impl Preamble {
    pub fn encode(&self) -> [u8; PREAMBLE_LEN] {
        let mut out = [0u8; PREAMBLE_LEN];
        out[..4].copy_from_slice(&self.kind.to_le_bytes());
        out[4..].copy_from_slice(&self.tail_len.to_le_bytes());
        out
    }

    /// Decodes the preamble prefix of `frame`.
    pub fn decode(frame: &[u8]) -> FabricResult<Self> {
        if frame.len() < PREAMBLE_LEN {
            return Err(FabricError::protocol(format!(
                "frame of {} bytes is shorter than the preamble",
                frame.len()
            )));
        }
        let mut kind = [0u8; 4];
        let mut tail_len = [0u8; 4];
        kind.copy_from_slice(&frame[..4]);
        tail_len.copy_from_slice(&frame[4..PREAMBLE_LEN]);
        Ok(Self {
            kind: u32::from_le_bytes(kind),
            tail_len: u32::from_le_bytes(tail_len),
        })
    }
}

/// One request or response, without attached descriptors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub kind: u32,
    pub head: Vec<u8>,
    pub tail: Vec<u8>,
}

impl Message {
    pub fn new(kind: u32, head: Vec<u8>) -> Self {
        Self {
            kind,
            head,
            tail: Vec::new(),
        }
    }

    pub fn with_tail(mut self, tail: Vec<u8>) -> Self {
        self.tail = tail;
        self
    }

    pub fn preamble(&self) -> FabricResult<Preamble> {
        let tail_len = u32::try_from(self.tail.len())
            .map_err(|_| FabricError::codec("message tail exceeds u32::MAX bytes"))?;
        Ok(Preamble {
            kind: self.kind,
            tail_len,
        })
    }
}

pub(crate) fn write_message(lane: &Lane, message: &Message) -> FabricResult<()> {
    let preamble = message.preamble()?;
    let mut frame = Vec::with_capacity(PREAMBLE_LEN + message.head.len());
    frame.extend_from_slice(&preamble.encode());
    frame.extend_from_slice(&message.head);
    lane.send_bytes(frame)?;
    if preamble.tail_len > 0 {
        lane.send_bytes(message.tail.clone())?;
    }
    trace!(
        lane = lane.id(),
        kind = preamble.kind,
        head = message.head.len(),
        tail = preamble.tail_len,
        "message sent"
    );
    Ok(())
}

pub(crate) async fn read_message(lane: &mut Lane) -> FabricResult<Message> {
    let frame = lane.recv_bytes().await.map_err(frame_error)?;
    let preamble = Preamble::decode(&frame)?;
    let head = frame[PREAMBLE_LEN..].to_vec();

    let tail = if preamble.tail_len > 0 {
        let tail = lane.recv_bytes().await.map_err(frame_error)?;
        if tail.len() != preamble.tail_len as usize {
            return Err(FabricError::protocol(format!(
                "preamble announced a {} byte tail, received {}",
                preamble.tail_len,
                tail.len()
            )));
        }
        tail
    } else {
        Vec::new()
    };

    Ok(Message {
        kind: preamble.kind,
        head,
        tail,
    })
}

fn frame_error(err: LaneError) -> FabricError {
    match err {
        LaneError::EndOfLane => FabricError::Transport(err),
        LaneError::Mismatch { .. } => FabricError::protocol(err.to_string()),
    }
}
