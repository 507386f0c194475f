use serde::{Deserialize, Serialize};

/// Size of one byte ring. Must be a power of two of at least 64 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub capacity_bytes: usize,
}

impl RingConfig {
    pub const fn new(capacity_bytes: usize) -> Self {
        Self { capacity_bytes }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self::new(1 << 16)
    }
}

/// Physical memory as reported by `GetMemoryInformation`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub total_pages: u64,
    pub free_pages: u64,
    pub page_size: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            total_pages: 1 << 18,
            free_pages: 1 << 17,
            page_size: 4096,
        }
    }
}

/// Everything the kerncfg object and its rings are built from.
///
/// Optional rings stay absent unless configured; the kernel log always
/// exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KerncfgConfig {
    pub cmdline: String,
    pub num_cpus: u32,
    pub memory: MemoryConfig,
    pub log_ring: RingConfig,
    pub profile_ring: Option<RingConfig>,
    pub os_trace_ring: Option<RingConfig>,
    pub heap_trace_ring: Option<RingConfig>,
}

impl Default for KerncfgConfig {
    fn default() -> Self {
        Self {
            cmdline: String::new(),
            num_cpus: 1,
            memory: MemoryConfig::default(),
            log_ring: RingConfig::default(),
            profile_ring: None,
            os_trace_ring: None,
            heap_trace_ring: None,
        }
    }
}
