//! Emulated hardware device object.
//!
//! A [`HwDeviceObject`] describes one PCI function: it reports BARs and
//! capabilities, hands out memory and interrupt capabilities, tracks the
//! claim and enable state, and serves an emulated configuration space.
//! Capabilities are attached only to successful responses.

#![allow(missing_docs)]

mod config;
mod space;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bitflags::bitflags;
use futures::executor::LocalSpawner;
use futures::task::{LocalSpawnExt, SpawnError};
use service_abi::{HwRequest, HwResponse, IoType, PciCapability, PciInfo, Status};
use services_common::{serve, Handled, ServiceObject};
use tracing::{debug, warn};
use transport_codecs::HwCodec;
use transport_fabric::{listener, Capability, Connector, IrqLine, MemoryRegion};

pub use crate::config::HwDeviceConfig;
pub use crate::space::CONFIG_SPACE_LEN;

use crate::space::{fits, ConfigSpace, COMMAND_BUSMASTER, COMMAND_INTX_DISABLE};

bitflags! {
    /// Ownership and enable state of the device.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DeviceState: u8 {
        const CLAIMED = 1 << 0;
        const BUS_IRQ = 1 << 1;
        const MSI = 1 << 2;
        const BUSMASTER = 1 << 3;
    }
}

pub struct HwDeviceObject {
    name: String,
    info: PciInfo,
    irq_lines: Vec<u32>,
    msi_base: u32,
    state: Cell<DeviceState>,
    space: RefCell<ConfigSpace>,
    codec: HwCodec,
}

impl HwDeviceObject {
    pub fn new(name: impl Into<String>, config: &HwDeviceConfig) -> Self {
        let name = name.into();
        let capabilities: Vec<PciCapability> = config
            .capabilities
            .iter()
            .filter(|capability| {
                let keep = fits(capability);
                if !keep {
                    warn!(
                        device = %name,
                        offset = capability.offset,
                        length = capability.length,
                        "capability does not fit into config space; dropping it"
                    );
                }
                keep
            })
            .copied()
            .collect();
        let space = ConfigSpace::new(config, &capabilities);

        Self {
            name,
            info: PciInfo {
                bars: config.bars.clone(),
                capabilities,
                num_msis: config.num_msis,
            },
            irq_lines: config.irq_lines.clone(),
            msi_base: config.msi_base,
            state: Cell::new(DeviceState::empty()),
            space: RefCell::new(space),
            codec: HwCodec,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state.get()
    }

    pub fn command(&self) -> u16 {
        self.space.borrow().command()
    }

    fn enable(&self, flag: DeviceState) {
        self.state.set(self.state.get() | flag);
        debug!(device = %self.name, state = ?self.state.get(), "device state changed");
    }

    fn access_bar(&self, index: u32) -> Result<Capability, Status> {
        let bar = self
            .info
            .bars
            .get(index as usize)
            .ok_or(Status::OutOfBounds)?;
        // Only memory BARs can be handed out as a region.
        if bar.io_type != IoType::Memory {
            return Err(Status::IllegalArguments);
        }
        Ok(Capability::Memory(MemoryRegion {
            base: bar.address,
            len: bar.length,
        }))
    }

    fn access_irq(&self, index: u32) -> Result<Capability, Status> {
        let line = self
            .irq_lines
            .get(index as usize)
            .ok_or(Status::OutOfBounds)?;
        Ok(Capability::Irq(IrqLine { line: *line }))
    }

    fn install_msi(&self, index: u32) -> Result<Capability, Status> {
        if index >= self.info.num_msis {
            return Err(Status::OutOfBounds);
        }
        Ok(Capability::Irq(IrqLine {
            line: self.msi_base + index,
        }))
    }

    fn claim(&self) -> Result<(), Status> {
        if self.state.get().contains(DeviceState::CLAIMED) {
            return Err(Status::AlreadyClaimed);
        }
        self.enable(DeviceState::CLAIMED);
        Ok(())
    }

    fn update_command(&self, set: u16, clear: u16) {
        let mut space = self.space.borrow_mut();
        let command = (space.command() | set) & !clear;
        space.set_command(command);
    }

    fn load_capability(&self, index: u32, offset: u32, size: u32) -> Result<u32, Status> {
        let capability = self
            .info
            .capabilities
            .get(index as usize)
            .ok_or(Status::OutOfBounds)?;
        self.space.borrow().load_capability(capability, offset, size)
    }
}

fn with_descriptor(outcome: Result<Capability, Status>) -> Handled<HwResponse> {
    match outcome {
        Ok(capability) => Handled::new(HwResponse::Done).with_descriptor(capability),
        Err(status) => Handled::new(HwResponse::Error(status)),
    }
}

fn done(outcome: Result<(), Status>) -> Handled<HwResponse> {
    Handled::new(match outcome {
        Ok(()) => HwResponse::Done,
        Err(status) => HwResponse::Error(status),
    })
}

fn word(outcome: Result<u32, Status>) -> Handled<HwResponse> {
    Handled::new(match outcome {
        Ok(word) => HwResponse::Word(word),
        Err(status) => HwResponse::Error(status),
    })
}

impl ServiceObject for HwDeviceObject {
    type Codec = HwCodec;

    fn name(&self) -> &str {
        &self.name
    }

    fn codec(&self) -> &HwCodec {
        &self.codec
    }

    async fn handle(&self, request: HwRequest) -> Handled<HwResponse> {
        match request {
            HwRequest::GetPciInfo => Handled::new(HwResponse::PciInfo(self.info.clone())),
            HwRequest::AccessBar { index } => with_descriptor(self.access_bar(index)),
            HwRequest::AccessIrq { index } => with_descriptor(self.access_irq(index)),
            HwRequest::InstallMsi { index } => with_descriptor(self.install_msi(index)),
            HwRequest::ClaimDevice => done(self.claim()),
            HwRequest::EnableBusIrq => {
                self.update_command(0, COMMAND_INTX_DISABLE);
                self.enable(DeviceState::BUS_IRQ);
                done(Ok(()))
            }
            HwRequest::EnableMsi => {
                self.enable(DeviceState::MSI);
                done(Ok(()))
            }
            HwRequest::EnableBusmaster => {
                self.update_command(COMMAND_BUSMASTER, 0);
                self.enable(DeviceState::BUSMASTER);
                done(Ok(()))
            }
            HwRequest::LoadPciSpace { offset, size } => {
                word(self.space.borrow().load(offset, size))
            }
            HwRequest::StorePciSpace { offset, size, word } => {
                done(self.space.borrow_mut().store(offset, size, word))
            }
            HwRequest::LoadPciCapability {
                index,
                offset,
                size,
            } => word(self.load_capability(index, offset, size)),
        }
    }
}

/// Serves `object` on `spawner` and returns the connector clients use to
/// reach it.
pub fn start(object: HwDeviceObject, spawner: &LocalSpawner) -> Result<Connector, SpawnError> {
    let (connector, incoming) = listener();
    spawner.spawn_local(serve(Rc::new(object), incoming, spawner.clone()))?;
    Ok(connector)
}
