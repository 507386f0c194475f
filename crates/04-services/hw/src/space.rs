use service_abi::{PciCapability, Status};

use crate::config::HwDeviceConfig;

pub const CONFIG_SPACE_LEN: usize = 256;

pub(crate) const COMMAND_OFFSET: usize = 0x04;
pub(crate) const COMMAND_BUSMASTER: u16 = 1 << 2;
pub(crate) const COMMAND_INTX_DISABLE: u16 = 1 << 10;
const STATUS_OFFSET: usize = 0x06;
const STATUS_CAPABILITIES: u16 = 1 << 4;
const CAPABILITY_POINTER: usize = 0x34;

/// Emulated 256-byte configuration space.
///
/// Accesses are 1, 2 or 4 bytes wide, little endian, and must stay inside
/// the space.
pub(crate) struct ConfigSpace {
    bytes: [u8; CONFIG_SPACE_LEN],
}

impl ConfigSpace {
    /// Builds the space for `config`; `capabilities` must already satisfy
    /// [`fits`].
    pub(crate) fn new(config: &HwDeviceConfig, capabilities: &[PciCapability]) -> Self {
        let mut space = Self {
            bytes: [0; CONFIG_SPACE_LEN],
        };
        space.put(0x00, &config.vendor_id.to_le_bytes());
        space.put(0x02, &config.device_id.to_le_bytes());
        space.put(COMMAND_OFFSET, &COMMAND_INTX_DISABLE.to_le_bytes());

        // Chain the capability headers: id, then the offset of the next one.
        let mut next = CAPABILITY_POINTER;
        for capability in capabilities {
            space.put(next, &[capability.offset as u8]);
            space.put(capability.offset as usize, &[capability.kind, 0]);
            next = capability.offset as usize + 1;
        }
        if next != CAPABILITY_POINTER {
            space.put(STATUS_OFFSET, &STATUS_CAPABILITIES.to_le_bytes());
        }
        space
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) {
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn load(&self, offset: u32, size: u32) -> Result<u32, Status> {
        let range = checked_range(offset, size, CONFIG_SPACE_LEN)?;
        let mut word = [0u8; 4];
        word[..range.len()].copy_from_slice(&self.bytes[range]);
        Ok(u32::from_le_bytes(word))
    }

    pub(crate) fn store(&mut self, offset: u32, size: u32, word: u32) -> Result<(), Status> {
        let range = checked_range(offset, size, CONFIG_SPACE_LEN)?;
        let len = range.len();
        self.bytes[range].copy_from_slice(&word.to_le_bytes()[..len]);
        Ok(())
    }

    /// Reads inside one capability; `offset` is relative to its header.
    pub(crate) fn load_capability(
        &self,
        capability: &PciCapability,
        offset: u32,
        size: u32,
    ) -> Result<u32, Status> {
        checked_range(offset, size, capability.length as usize)?;
        self.load(capability.offset + offset, size)
    }

    pub(crate) fn command(&self) -> u16 {
        u16::from_le_bytes([self.bytes[COMMAND_OFFSET], self.bytes[COMMAND_OFFSET + 1]])
    }

    pub(crate) fn set_command(&mut self, command: u16) {
        self.put(COMMAND_OFFSET, &command.to_le_bytes());
    }
}

/// Whether a capability lies inside the device-specific part of the space.
pub(crate) fn fits(capability: &PciCapability) -> bool {
    let start = capability.offset as usize;
    start >= 0x40 && start + (capability.length as usize).max(2) <= CONFIG_SPACE_LEN
}

fn checked_range(offset: u32, size: u32, limit: usize) -> Result<std::ops::Range<usize>, Status> {
    if !matches!(size, 1 | 2 | 4) {
        return Err(Status::IllegalArguments);
    }
    let start = offset as usize;
    let end = start + size as usize;
    if end > limit {
        return Err(Status::OutOfBounds);
    }
    Ok(start..end)
}
