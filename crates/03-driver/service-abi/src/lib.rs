//! Service ABI types shared between service objects and their clients.
//!
//! Requests and responses here are the typed view of each protocol; the wire
//! representation lives in `transport-codecs`. Every response either carries
//! its payload or an application [`Status`] explaining why it could not.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

pub use transport::GetFlags;

/// Application-level result code carried in every response head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum Status {
    Success = 0,
    IllegalRequest = 1,
    WouldBlock = 2,
    OutOfBounds = 3,
    IllegalArguments = 4,
    AlreadyClaimed = 5,
}

impl Status {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Status::Success,
            1 => Status::IllegalRequest,
            2 => Status::WouldBlock,
            3 => Status::OutOfBounds,
            4 => Status::IllegalArguments,
            5 => Status::AlreadyClaimed,
            _ => return None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "success",
            Status::IllegalRequest => "illegal request",
            Status::WouldBlock => "would block",
            Status::OutOfBounds => "out of bounds",
            Status::IllegalArguments => "illegal arguments",
            Status::AlreadyClaimed => "already claimed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// kerncfg
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KerncfgRequest {
    GetCmdline,
    GetMemoryInformation,
    GetNumCpu,
}

/// Physical memory summary, in units of `memory_unit` bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryInformation {
    pub total_usable_memory: u64,
    pub available_memory: u64,
    pub memory_unit: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KerncfgResponse {
    Cmdline(String),
    MemoryInformation(MemoryInformation),
    NumCpu(u32),
    Error(Status),
}

// ---------------------------------------------------------------------------
// byte ring
// ---------------------------------------------------------------------------

/// Bulk read of a byte ring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferContentsRequest {
    /// Largest number of bytes the caller accepts.
    pub size: u32,
    /// Cursor to read from.
    pub dequeue: u64,
    /// Stop waiting once this many bytes were gathered.
    pub watermark: u32,
    pub flags: GetFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteRingRequest {
    GetBufferContents(BufferContentsRequest),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferContents {
    /// `Success` or `WouldBlock`.
    pub status: Status,
    pub data: Vec<u8>,
    /// Cursor of the first returned byte.
    pub effective_dequeue: u64,
    /// Cursor to pass to the next request.
    pub new_dequeue: u64,
    pub missed: bool,
    pub truncated: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ByteRingResponse {
    Contents(BufferContents),
    Error(Status),
}

// ---------------------------------------------------------------------------
// hw
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoType {
    #[default]
    None,
    Port,
    Memory,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarInfo {
    pub io_type: IoType,
    pub address: u64,
    pub length: u64,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PciCapability {
    /// PCI capability id.
    pub kind: u8,
    pub offset: u32,
    pub length: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PciInfo {
    pub bars: Vec<BarInfo>,
    pub capabilities: Vec<PciCapability>,
    pub num_msis: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HwRequest {
    GetPciInfo,
    /// Responds with one memory descriptor on success.
    AccessBar { index: u32 },
    /// Responds with one IRQ descriptor on success.
    AccessIrq { index: u32 },
    /// Responds with one IRQ descriptor on success.
    InstallMsi { index: u32 },
    ClaimDevice,
    EnableBusIrq,
    EnableMsi,
    EnableBusmaster,
    LoadPciSpace { offset: u32, size: u32 },
    StorePciSpace { offset: u32, size: u32, word: u32 },
    LoadPciCapability { index: u32, offset: u32, size: u32 },
}

impl HwRequest {
    /// Descriptors a successful response to this request carries.
    pub fn attached_descriptors(&self) -> usize {
        match self {
            HwRequest::AccessBar { .. }
            | HwRequest::AccessIrq { .. }
            | HwRequest::InstallMsi { .. } => 1,
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HwResponse {
    PciInfo(PciInfo),
    /// Acknowledgement for requests whose only result is a status or
    /// attached descriptors.
    Done,
    Word(u32),
    Error(Status),
}

impl HwResponse {
    pub fn status(&self) -> Status {
        match self {
            HwResponse::Error(status) => *status,
            _ => Status::Success,
        }
    }
}

// ---------------------------------------------------------------------------
// block
// ---------------------------------------------------------------------------

pub const SECTOR_SIZE: usize = 512;
pub const MAX_SECTORS_PER_REQUEST: usize = 255;
