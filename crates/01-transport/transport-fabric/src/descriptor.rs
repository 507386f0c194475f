//! Capabilities and the descriptors that carry them across lanes.

use std::fmt;

use crate::lane::Lane;

/// Physical memory window (e.g. a PCI BAR mapping).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub len: u64,
}

/// Interrupt line handed to a driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrqLine {
    pub line: u32,
}

/// A capability owned by the local side and transferable over a lane.
#[derive(Debug)]
pub enum Capability {
    Memory(MemoryRegion),
    Irq(IrqLine),
    Lane(Lane),
}

impl Capability {
    pub fn kind(&self) -> &'static str {
        match self {
            Capability::Memory(_) => "memory",
            Capability::Irq(_) => "irq",
            Capability::Lane(_) => "lane",
        }
    }
}

/// A capability received from a peer.
///
/// Descriptors cannot be built directly; the only source is
/// [`Lane::pull_descriptor`]. Using one consumes it.
pub struct Descriptor {
    capability: Capability,
}

impl Descriptor {
    pub(crate) fn received(capability: Capability) -> Self {
        Self { capability }
    }

    pub fn kind(&self) -> &'static str {
        self.capability.kind()
    }

    pub fn into_capability(self) -> Capability {
        self.capability
    }

    /// Takes the memory region, or hands the descriptor back if it carries
    /// something else.
    pub fn into_memory(self) -> Result<MemoryRegion, Descriptor> {
        match self.capability {
            Capability::Memory(region) => Ok(region),
            other => Err(Descriptor::received(other)),
        }
    }

    pub fn into_irq(self) -> Result<IrqLine, Descriptor> {
        match self.capability {
            Capability::Irq(irq) => Ok(irq),
            other => Err(Descriptor::received(other)),
        }
    }

    pub fn into_lane(self) -> Result<Lane, Descriptor> {
        match self.capability {
            Capability::Lane(lane) => Ok(lane),
            other => Err(Descriptor::received(other)),
        }
    }
}

impl From<Descriptor> for Capability {
    fn from(descriptor: Descriptor) -> Self {
        descriptor.into_capability()
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Descriptor").field(&self.capability).finish()
    }
}
