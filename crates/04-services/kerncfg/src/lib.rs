//! Kernel configuration services.
//!
//! [`Kerncfg::start`] creates the byte rings named in a [`KerncfgConfig`],
//! then exposes the kerncfg object and one byte-ring object per ring on the
//! given executor. Objects and rings live until the executor is dropped.

#![allow(missing_docs)]

mod config;
mod log_layer;
mod objects;
mod rings;

use std::rc::Rc;
use std::sync::Arc;

use futures::executor::LocalSpawner;
use futures::task::{LocalSpawnExt, SpawnError};
use services_common::serve;
use thiserror::Error;
use tracing::info;
use transport::{LogRing, TransportError};
use transport_fabric::{listener, Connector, Lane, LaneError};

pub use crate::config::{KerncfgConfig, MemoryConfig, RingConfig};
pub use crate::log_layer::KernelLogLayer;
pub use crate::objects::{ByteRingObject, KerncfgObject};
pub use crate::rings::{KernelRings, RingPurpose};

#[derive(Debug, Error)]
pub enum KerncfgError {
    #[error("invalid ring configuration: {0}")]
    Ring(#[from] TransportError),

    #[error("no {0} ring is configured")]
    NoSuchRing(RingPurpose),

    #[error("cannot connect: {0}")]
    Connect(#[from] LaneError),

    #[error("failed to spawn service loop: {0}")]
    Spawn(#[from] SpawnError),
}

pub type KerncfgResult<T> = Result<T, KerncfgError>;

/// Handle to the running kerncfg services.
pub struct Kerncfg {
    rings: KernelRings,
    kerncfg: Connector,
    byte_rings: Vec<(RingPurpose, Connector)>,
}

impl Kerncfg {
    pub fn start(config: &KerncfgConfig, spawner: &LocalSpawner) -> KerncfgResult<Self> {
        let rings = KernelRings::new(config)?;

        let (kerncfg, incoming) = listener();
        spawner.spawn_local(serve(
            Rc::new(KerncfgObject::new(config)),
            incoming,
            spawner.clone(),
        ))?;

        let mut byte_rings = Vec::new();
        for (purpose, ring) in rings.iter() {
            let (connector, incoming) = listener();
            let object = ByteRingObject::new(purpose, Arc::clone(ring));
            spawner.spawn_local(serve(Rc::new(object), incoming, spawner.clone()))?;
            byte_rings.push((purpose, connector));
        }

        info!(rings = ?rings, cpus = config.num_cpus, "kerncfg started");
        Ok(Self {
            rings,
            kerncfg,
            byte_rings,
        })
    }

    pub fn rings(&self) -> &KernelRings {
        &self.rings
    }

    pub fn kernel_log(&self) -> &Arc<LogRing> {
        self.rings.kernel_log()
    }

    /// Opens a connection to the kerncfg object.
    pub fn connect(&self) -> KerncfgResult<Lane> {
        Ok(self.kerncfg.connect()?)
    }

    /// Opens a connection to the byte-ring object for `purpose`.
    pub fn connect_ring(&self, purpose: RingPurpose) -> KerncfgResult<Lane> {
        let (_, connector) = self
            .byte_rings
            .iter()
            .find(|(candidate, _)| *candidate == purpose)
            .ok_or(KerncfgError::NoSuchRing(purpose))?;
        Ok(connector.connect()?)
    }
}
