//! Wire message kinds and archived head layouts.
//!
//! `rkyv` expands `Archive` derives into archived mirrors that inherit
//! `#[allow(missing_docs)]`, so missing docs are permitted module-wide.
//!
//! Kind ids are part of the wire contract: changing one breaks every peer
//! that speaks the protocol.
#![allow(missing_docs)]

use rkyv::{Archive, Serialize};

/// kerncfg protocol kinds.
pub mod kerncfg {
    pub const GET_CMDLINE: u32 = 0x0100;
    pub const GET_MEMORY_INFORMATION: u32 = 0x0101;
    pub const GET_NUM_CPU: u32 = 0x0102;
    pub const SVR_RESPONSE: u32 = 0x01FF;
}

/// byte-ring protocol kinds.
pub mod byte_ring {
    pub const GET_BUFFER_CONTENTS: u32 = 0x0110;
    pub const SVR_RESPONSE: u32 = 0x011F;
}

/// hw protocol kinds.
pub mod hw {
    pub const GET_PCI_INFO: u32 = 0x0200;
    pub const ACCESS_BAR: u32 = 0x0201;
    pub const ACCESS_IRQ: u32 = 0x0202;
    pub const INSTALL_MSI: u32 = 0x0203;
    pub const CLAIM_DEVICE: u32 = 0x0204;
    pub const ENABLE_BUS_IRQ: u32 = 0x0205;
    pub const ENABLE_MSI: u32 = 0x0206;
    pub const ENABLE_BUSMASTER: u32 = 0x0207;
    pub const LOAD_PCI_SPACE: u32 = 0x0208;
    pub const STORE_PCI_SPACE: u32 = 0x0209;
    pub const LOAD_PCI_CAPABILITY: u32 = 0x020A;
    pub const SVR_RESPONSE: u32 = 0x02FF;
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(
        allow(missing_docs),
        doc = "Archived representation of `KerncfgResponseV1`."
    ),
    bytecheck()
)]
pub enum KerncfgResponseV1 {
    /// The command line follows as the tail.
    Cmdline { size: u32 },
    MemoryInformation {
        total_usable_memory: u64,
        available_memory: u64,
        memory_unit: u64,
    },
    NumCpu { num_cpu: u32 },
    Error { status: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(
        allow(missing_docs),
        doc = "Archived representation of `BufferContentsRequestV1`."
    ),
    bytecheck()
)]
pub struct BufferContentsRequestV1 {
    pub size: u32,
    pub dequeue: u64,
    pub watermark: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(
        allow(missing_docs),
        doc = "Archived representation of `ByteRingResponseV1`."
    ),
    bytecheck()
)]
pub enum ByteRingResponseV1 {
    /// Ring bytes follow as the tail.
    Contents {
        status: u32,
        effective_dequeue: u64,
        new_dequeue: u64,
        missed: bool,
        truncated: bool,
    },
    Error { status: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `IndexV1`."),
    bytecheck()
)]
pub struct IndexV1 {
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `PciSpaceV1`."),
    bytecheck()
)]
pub struct PciSpaceV1 {
    pub offset: u32,
    pub size: u32,
    pub word: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(
        allow(missing_docs),
        doc = "Archived representation of `PciCapabilitySpaceV1`."
    ),
    bytecheck()
)]
pub struct PciCapabilitySpaceV1 {
    pub index: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `BarV1`."),
    bytecheck()
)]
pub struct BarV1 {
    /// 0 = none, 1 = port, 2 = memory.
    pub io_type: u8,
    pub address: u64,
    pub length: u64,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `CapabilityV1`."),
    bytecheck()
)]
pub struct CapabilityV1 {
    pub kind: u8,
    pub offset: u32,
    pub length: u32,
}

/// Tail of a `GetPciInfo` response.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `PciInfoTailV1`."),
    bytecheck()
)]
pub struct PciInfoTailV1 {
    pub bars: Vec<BarV1>,
    pub capabilities: Vec<CapabilityV1>,
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize)]
#[rkyv(
    attr(allow(missing_docs), doc = "Archived representation of `HwResponseV1`."),
    bytecheck()
)]
pub enum HwResponseV1 {
    /// `PciInfoTailV1` follows as the tail.
    PciInfo { num_msis: u32 },
    Done,
    Word { word: u32 },
    Error { status: u32 },
}
