use std::cell::{Cell, RefCell};
use std::task::Poll;

use futures::future::poll_fn;
use serde::{Deserialize, Serialize};
use service_abi::SECTOR_SIZE;
use services_common::Device;
use tracing::{debug, trace};

use crate::wrapper::{CommandBlock, CommandStatus, Direction, STATUS_SIGNATURE};
use crate::{BlockOp, DeviceError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Capacity in 512-byte sectors.
    pub sectors: u64,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self { sectors: 2048 }
    }
}

/// A failure the next status phase reports instead of the real outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    Signature(u32),
    Tag(u32),
    Residue(u32),
    Status(u8),
}

/// RAM-backed disk speaking the bulk-only command/data/status protocol.
///
/// Every operation suspends once per phase, so other tasks interleave with
/// a running command the way they would with real transfers.
pub struct MemoryDisk {
    data: RefCell<Vec<u8>>,
    sectors: u64,
    next_tag: Cell<u32>,
    fault: Cell<Option<Fault>>,
    busy: Cell<bool>,
}

impl MemoryDisk {
    pub fn new(config: DiskConfig) -> Self {
        Self {
            data: RefCell::new(vec![0; config.sectors as usize * SECTOR_SIZE]),
            sectors: config.sectors,
            next_tag: Cell::new(1),
            fault: Cell::new(None),
            busy: Cell::new(false),
        }
    }

    pub fn sectors(&self) -> u64 {
        self.sectors
    }

    /// Makes the next status phase report `fault`.
    pub fn inject_status(&self, fault: Fault) {
        self.fault.set(Some(fault));
    }

    /// Whether a command is between its command and status phases.
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    fn command_phase(&self, block: &CommandBlock) -> Result<CommandBlock, DeviceError> {
        CommandBlock::decode(&block.encode())
    }

    /// Moves data for `command`; returns the number of bytes transferred.
    fn data_phase(&self, command: &CommandBlock, buffer: &mut [u8]) -> usize {
        let end = command.lba as u64 + command.sectors as u64;
        if end > self.sectors {
            debug!(lba = command.lba, sectors = command.sectors, "command beyond end of disk");
            return 0;
        }
        let start = command.lba as usize * SECTOR_SIZE;
        let len = command.sectors as usize * SECTOR_SIZE;
        let mut data = self.data.borrow_mut();
        match command.direction {
            Direction::In => buffer[..len].copy_from_slice(&data[start..start + len]),
            Direction::Out => data[start..start + len].copy_from_slice(&buffer[..len]),
        }
        len
    }

    fn status_phase(&self, command: &CommandBlock, transferred: usize) -> CommandStatus {
        let residue = command.transfer_len.saturating_sub(transferred as u32);
        let mut status = CommandStatus {
            signature: STATUS_SIGNATURE,
            tag: command.tag,
            residue,
            status: u8::from(residue != 0),
        };
        match self.fault.take() {
            None => {}
            Some(Fault::Signature(signature)) => status.signature = signature,
            Some(Fault::Tag(tag)) => status.tag = tag,
            Some(Fault::Residue(residue)) => status.residue = residue,
            Some(Fault::Status(code)) => status.status = code,
        }
        CommandStatus::decode(&status.encode())
    }
}

async fn next_phase() {
    let mut yielded = false;
    poll_fn(|cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await
}

impl Device for MemoryDisk {
    type Op = BlockOp;
    type Output = Vec<u8>;
    type Error = DeviceError;

    async fn perform(&self, op: BlockOp) -> Result<Vec<u8>, DeviceError> {
        let (direction, sector, mut buffer) = match op {
            BlockOp::Read { sector, buffer } => (Direction::In, sector, buffer),
            BlockOp::Write { sector, buffer } => (Direction::Out, sector, buffer),
        };
        let lba = u32::try_from(sector).map_err(|_| DeviceError::Unaddressable(sector))?;
        let tag = self.next_tag.get();
        self.next_tag.set(tag.wrapping_add(1));
        let block = CommandBlock {
            tag,
            direction,
            lba,
            sectors: (buffer.len() / SECTOR_SIZE) as u16,
            transfer_len: buffer.len() as u32,
        };

        self.busy.set(true);
        trace!(tag, sector, len = buffer.len(), ?direction, "command phase");
        let command = self.command_phase(&block);
        next_phase().await;

        let transferred = match &command {
            Ok(command) => self.data_phase(command, &mut buffer),
            Err(_) => 0,
        };
        next_phase().await;

        let outcome = command.map(|command| self.status_phase(&command, transferred));
        next_phase().await;
        self.busy.set(false);

        outcome?.check(tag)?;
        Ok(buffer)
    }
}
