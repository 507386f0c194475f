use std::fmt;
use std::sync::Arc;

use tracing::debug;
use transport::{LogRing, TransportResult};

use crate::config::{KerncfgConfig, RingConfig};

/// What a byte ring carries. Clients pick a ring by purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RingPurpose {
    KernelLog,
    HeapTrace,
    KernelProfile,
    OsTrace,
}

impl RingPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            RingPurpose::KernelLog => "kernel-log",
            RingPurpose::HeapTrace => "heap-trace",
            RingPurpose::KernelProfile => "kernel-profile",
            RingPurpose::OsTrace => "os-trace",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "kernel-log" => RingPurpose::KernelLog,
            "heap-trace" => RingPurpose::HeapTrace,
            "kernel-profile" => RingPurpose::KernelProfile,
            "os-trace" => RingPurpose::OsTrace,
            _ => return None,
        })
    }
}

impl fmt::Display for RingPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The byte rings that exist for the lifetime of the process.
///
/// Built once from configuration; rings are never added or removed
/// afterwards. Iteration order is the creation order: kernel log first, then
/// heap trace, kernel profile and OS trace when enabled.
#[derive(Clone)]
pub struct KernelRings {
    kernel_log: Arc<LogRing>,
    rings: Vec<(RingPurpose, Arc<LogRing>)>,
}

impl KernelRings {
    pub fn new(config: &KerncfgConfig) -> TransportResult<Self> {
        let kernel_log = Arc::new(LogRing::new(config.log_ring.capacity_bytes)?);
        let wanted: [(RingPurpose, Option<RingConfig>); 3] = [
            (RingPurpose::HeapTrace, config.heap_trace_ring),
            (RingPurpose::KernelProfile, config.profile_ring),
            (RingPurpose::OsTrace, config.os_trace_ring),
        ];

        let mut rings = Vec::with_capacity(wanted.len() + 1);
        rings.push((RingPurpose::KernelLog, Arc::clone(&kernel_log)));
        for (purpose, ring) in wanted {
            let Some(ring) = ring else { continue };
            rings.push((purpose, Arc::new(LogRing::new(ring.capacity_bytes)?)));
            debug!(%purpose, capacity = ring.capacity_bytes, "created byte ring");
        }
        Ok(Self { kernel_log, rings })
    }

    pub fn kernel_log(&self) -> &Arc<LogRing> {
        &self.kernel_log
    }

    pub fn get(&self, purpose: RingPurpose) -> Option<&Arc<LogRing>> {
        self.rings
            .iter()
            .find(|(candidate, _)| *candidate == purpose)
            .map(|(_, ring)| ring)
    }

    pub fn purposes(&self) -> impl Iterator<Item = RingPurpose> + '_ {
        self.rings.iter().map(|(purpose, _)| *purpose)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RingPurpose, &Arc<LogRing>)> {
        self.rings.iter().map(|(purpose, ring)| (*purpose, ring))
    }
}

impl fmt::Debug for KernelRings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.purposes()).finish()
    }
}
