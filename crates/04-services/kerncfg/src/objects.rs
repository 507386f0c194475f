use std::sync::Arc;

use service_abi::{
    BufferContents, ByteRingRequest, ByteRingResponse, KerncfgRequest, KerncfgResponse,
    MemoryInformation, Status,
};
use services_common::{Handled, ServiceObject};
use tracing::trace;
use transport::{GetRequest, GetStatus, LogRing};
use transport_codecs::{ByteRingCodec, KerncfgCodec};

use crate::config::KerncfgConfig;
use crate::rings::RingPurpose;

/// Answers command line, memory and CPU queries from a fixed configuration.
pub struct KerncfgObject {
    cmdline: String,
    memory: MemoryInformation,
    num_cpus: u32,
    codec: KerncfgCodec,
}

impl KerncfgObject {
    pub fn new(config: &KerncfgConfig) -> Self {
        Self {
            cmdline: config.cmdline.clone(),
            memory: MemoryInformation {
                total_usable_memory: config.memory.total_pages,
                available_memory: config.memory.free_pages,
                memory_unit: config.memory.page_size,
            },
            num_cpus: config.num_cpus,
            codec: KerncfgCodec,
        }
    }
}

impl ServiceObject for KerncfgObject {
    type Codec = KerncfgCodec;

    fn name(&self) -> &str {
        "kerncfg"
    }

    fn codec(&self) -> &KerncfgCodec {
        &self.codec
    }

    async fn handle(&self, request: KerncfgRequest) -> Handled<KerncfgResponse> {
        let response = match request {
            KerncfgRequest::GetCmdline => KerncfgResponse::Cmdline(self.cmdline.clone()),
            KerncfgRequest::GetMemoryInformation => KerncfgResponse::MemoryInformation(self.memory),
            KerncfgRequest::GetNumCpu => KerncfgResponse::NumCpu(self.num_cpus),
        };
        Handled::new(response)
    }
}

/// Exposes one [`LogRing`] for bulk reads.
pub struct ByteRingObject {
    purpose: RingPurpose,
    ring: Arc<LogRing>,
    codec: ByteRingCodec,
}

impl ByteRingObject {
    pub fn new(purpose: RingPurpose, ring: Arc<LogRing>) -> Self {
        Self {
            purpose,
            ring,
            codec: ByteRingCodec,
        }
    }

    pub fn purpose(&self) -> RingPurpose {
        self.purpose
    }
}

impl ServiceObject for ByteRingObject {
    type Codec = ByteRingCodec;

    fn name(&self) -> &str {
        self.purpose.as_str()
    }

    fn codec(&self) -> &ByteRingCodec {
        &self.codec
    }

    async fn handle(&self, request: ByteRingRequest) -> Handled<ByteRingResponse> {
        let ByteRingRequest::GetBufferContents(req) = request;
        // The ring never holds more than its capacity, so a larger buffer
        // only wastes memory.
        let max_len = (req.size as usize).min(self.ring.capacity());
        trace!(
            ring = %self.purpose,
            dequeue = req.dequeue,
            size = req.size,
            watermark = req.watermark,
            "bulk read"
        );

        let out = self
            .ring
            .get(GetRequest {
                cursor: req.dequeue,
                max_len,
                flags: req.flags,
                watermark: req.watermark as usize,
            })
            .await;

        let status = match out.status {
            GetStatus::Success => Status::Success,
            GetStatus::WouldBlock => Status::WouldBlock,
        };
        Handled::new(ByteRingResponse::Contents(BufferContents {
            status,
            data: out.data,
            effective_dequeue: out.effective_start,
            new_dequeue: out.next_cursor,
            missed: out.missed,
            truncated: out.truncated,
        }))
    }
}
