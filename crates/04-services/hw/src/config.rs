use serde::{Deserialize, Serialize};
use service_abi::{BarInfo, IoType, PciCapability};

/// Static description of one emulated PCI function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HwDeviceConfig {
    pub vendor_id: u16,
    pub device_id: u16,
    pub bars: Vec<BarInfo>,
    /// Capabilities, laid out in config space at their `offset`.
    pub capabilities: Vec<PciCapability>,
    /// Legacy interrupt lines handed out by `AccessIrq`.
    pub irq_lines: Vec<u32>,
    pub num_msis: u32,
    /// Line of the first MSI vector; vector `n` maps to `msi_base + n`.
    pub msi_base: u32,
}

impl Default for HwDeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x8086,
            device_id: 0x100e,
            bars: vec![
                BarInfo {
                    io_type: IoType::Memory,
                    address: 0xfebc_0000,
                    length: 0x2_0000,
                    offset: 0,
                },
                BarInfo {
                    io_type: IoType::Port,
                    address: 0xc000,
                    length: 0x40,
                    offset: 0,
                },
            ],
            capabilities: vec![PciCapability {
                kind: 0x05,
                offset: 0x50,
                length: 0x18,
            }],
            irq_lines: vec![11],
            num_msis: 1,
            msi_base: 64,
        }
    }
}
