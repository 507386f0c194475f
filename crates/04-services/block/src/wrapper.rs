//! Bulk-only command and status wrappers exchanged with the disk.

use crate::DeviceError;

pub const COMMAND_SIGNATURE: u32 = 0x4342_5355;
pub const STATUS_SIGNATURE: u32 = 0x5342_5355;
pub const COMMAND_BLOCK_LEN: usize = 31;
pub const COMMAND_STATUS_LEN: usize = 13;

const DIRECTION_IN: u8 = 0x80;
const READ_10: u8 = 0x28;
const WRITE_10: u8 = 0x2a;
const OPCODE_LEN: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// One READ(10) or WRITE(10) command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandBlock {
    pub tag: u32,
    pub direction: Direction,
    pub lba: u32,
    pub sectors: u16,
    pub transfer_len: u32,
}

impl CommandBlock {
    pub fn encode(&self) -> [u8; COMMAND_BLOCK_LEN] {
        let mut out = [0u8; COMMAND_BLOCK_LEN];
        out[0..4].copy_from_slice(&COMMAND_SIGNATURE.to_le_bytes());
        out[4..8].copy_from_slice(&self.tag.to_le_bytes());
        out[8..12].copy_from_slice(&self.transfer_len.to_le_bytes());
        out[12] = match self.direction {
            Direction::In => DIRECTION_IN,
            Direction::Out => 0,
        };
        out[14] = OPCODE_LEN;

        let command = &mut out[15..];
        command[0] = match self.direction {
            Direction::In => READ_10,
            Direction::Out => WRITE_10,
        };
        command[2..6].copy_from_slice(&self.lba.to_be_bytes());
        command[7..9].copy_from_slice(&self.sectors.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8; COMMAND_BLOCK_LEN]) -> Result<Self, DeviceError> {
        let signature = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if signature != COMMAND_SIGNATURE || bytes[14] != OPCODE_LEN {
            return Err(DeviceError::MalformedCommand);
        }
        let command = &bytes[15..];
        let direction = match (command[0], bytes[12]) {
            (READ_10, DIRECTION_IN) => Direction::In,
            (WRITE_10, 0) => Direction::Out,
            _ => return Err(DeviceError::MalformedCommand),
        };
        Ok(Self {
            tag: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            direction,
            lba: u32::from_be_bytes([command[2], command[3], command[4], command[5]]),
            sectors: u16::from_be_bytes([command[7], command[8]]),
            transfer_len: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// Status the disk reports after the data phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandStatus {
    pub signature: u32,
    pub tag: u32,
    pub residue: u32,
    pub status: u8,
}

impl CommandStatus {
    pub fn passed(tag: u32) -> Self {
        Self {
            signature: STATUS_SIGNATURE,
            tag,
            residue: 0,
            status: 0,
        }
    }

    pub fn encode(&self) -> [u8; COMMAND_STATUS_LEN] {
        let mut out = [0u8; COMMAND_STATUS_LEN];
        out[0..4].copy_from_slice(&self.signature.to_le_bytes());
        out[4..8].copy_from_slice(&self.tag.to_le_bytes());
        out[8..12].copy_from_slice(&self.residue.to_le_bytes());
        out[12] = self.status;
        out
    }

    pub fn decode(bytes: &[u8; COMMAND_STATUS_LEN]) -> Self {
        Self {
            signature: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            tag: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            residue: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            status: bytes[12],
        }
    }

    /// Accepts the status only if it answers command `tag` completely.
    pub fn check(&self, tag: u32) -> Result<(), DeviceError> {
        if self.signature != STATUS_SIGNATURE {
            return Err(DeviceError::BadSignature(self.signature));
        }
        if self.tag != tag {
            return Err(DeviceError::TagMismatch {
                expected: tag,
                found: self.tag,
            });
        }
        if self.status != 0 {
            return Err(DeviceError::CommandFailed(self.status));
        }
        if self.residue != 0 {
            return Err(DeviceError::Residue(self.residue));
        }
        Ok(())
    }
}
