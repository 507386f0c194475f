use futures::task::SpawnError;
use thiserror::Error;

use crate::lane::LaneError;

pub type FabricResult<T> = Result<T, FabricError>;

#[derive(Debug, Error)]
pub enum FabricError {
    /// The lane itself failed; the connection is presumed broken.
    #[error("transport error: {0}")]
    Transport(#[from] LaneError),

    /// The peer sent something that does not follow the wire protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A descriptor promised by the response could not be pulled.
    #[error("descriptor transfer failed: {0}")]
    Descriptor(LaneError),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("spawn failed: {0}")]
    Spawn(#[from] SpawnError),
}

impl FabricError {
    pub fn codec(msg: impl Into<String>) -> Self {
        FabricError::Codec(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        FabricError::ProtocolViolation(msg.into())
    }

    /// Whether the failure leaves the lane unusable.
    pub fn is_transport(&self) -> bool {
        matches!(self, FabricError::Transport(_))
    }
}
