//! Typed clients for lane-backed service objects.
//!
//! Each client wraps a connection lane and runs one exchange per call. An
//! application status other than success comes back as
//! [`ClientError::Rejected`]; transport and protocol failures keep their
//! [`FabricError`] classification.

#![allow(missing_docs)]

use service_abi::{
    BufferContents, BufferContentsRequest, ByteRingRequest, ByteRingResponse, GetFlags,
    HwRequest, HwResponse, KerncfgRequest, KerncfgResponse, MemoryInformation, PciInfo, Status,
};
use thiserror::Error;
use tracing::debug;
use transport_codecs::{ByteRingCodec, HwCodec, KerncfgCodec};
use transport_fabric::{
    call, Codec, Descriptor, Exchange, FabricError, IrqLine, Lane, MemoryRegion,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error("request rejected: {0}")]
    Rejected(Status),

    #[error("unexpected response: expected {0}")]
    Unexpected(&'static str),
}

impl ClientError {
    /// Application status behind a rejection, if that is what this is.
    pub fn status(&self) -> Option<Status> {
        match self {
            ClientError::Rejected(status) => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

async fn request<C: Codec>(lane: &Lane, codec: &C, request: &C::Request) -> ClientResult<C::Response> {
    let message = codec.encode_request(request)?;
    let reply = call(lane, &message).await?;
    Ok(codec.decode_response(&reply)?)
}

// ---------------------------------------------------------------------------
// kerncfg
// ---------------------------------------------------------------------------

pub struct KerncfgClient {
    lane: Lane,
    codec: KerncfgCodec,
}

impl KerncfgClient {
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            codec: KerncfgCodec,
        }
    }

    async fn ask(&self, req: KerncfgRequest) -> ClientResult<KerncfgResponse> {
        match request(&self.lane, &self.codec, &req).await? {
            KerncfgResponse::Error(status) => Err(ClientError::Rejected(status)),
            other => Ok(other),
        }
    }

    pub async fn cmdline(&self) -> ClientResult<String> {
        match self.ask(KerncfgRequest::GetCmdline).await? {
            KerncfgResponse::Cmdline(cmdline) => Ok(cmdline),
            _ => Err(ClientError::Unexpected("command line")),
        }
    }

    pub async fn memory_information(&self) -> ClientResult<MemoryInformation> {
        match self.ask(KerncfgRequest::GetMemoryInformation).await? {
            KerncfgResponse::MemoryInformation(info) => Ok(info),
            _ => Err(ClientError::Unexpected("memory information")),
        }
    }

    pub async fn num_cpu(&self) -> ClientResult<u32> {
        match self.ask(KerncfgRequest::GetNumCpu).await? {
            KerncfgResponse::NumCpu(count) => Ok(count),
            _ => Err(ClientError::Unexpected("cpu count")),
        }
    }
}

// ---------------------------------------------------------------------------
// byte ring
// ---------------------------------------------------------------------------

pub struct ByteRingClient {
    lane: Lane,
    codec: ByteRingCodec,
}

impl ByteRingClient {
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            codec: ByteRingCodec,
        }
    }

    /// One bulk read. `WouldBlock` is reported through `status`, not as an
    /// error.
    pub async fn get_buffer_contents(
        &self,
        req: BufferContentsRequest,
    ) -> ClientResult<BufferContents> {
        let req = ByteRingRequest::GetBufferContents(req);
        match request(&self.lane, &self.codec, &req).await? {
            ByteRingResponse::Contents(contents) => Ok(contents),
            ByteRingResponse::Error(status) => Err(ClientError::Rejected(status)),
        }
    }

    /// Reader that keeps its own cursor, starting at `dequeue`.
    pub fn reader(&self, dequeue: u64) -> RingReader<'_> {
        RingReader {
            client: self,
            dequeue,
            missed: 0,
        }
    }
}

/// Sequential reader over a byte ring.
pub struct RingReader<'a> {
    client: &'a ByteRingClient,
    dequeue: u64,
    missed: u64,
}

impl RingReader<'_> {
    pub fn cursor(&self) -> u64 {
        self.dequeue
    }

    /// Bytes skipped because the ring overwrote them before they were read.
    pub fn missed_bytes(&self) -> u64 {
        self.missed
    }

    pub async fn read(
        &mut self,
        size: u32,
        watermark: u32,
        flags: GetFlags,
    ) -> ClientResult<BufferContents> {
        let contents = self
            .client
            .get_buffer_contents(BufferContentsRequest {
                size,
                dequeue: self.dequeue,
                watermark,
                flags,
            })
            .await?;
        if contents.missed {
            let skipped = contents.effective_dequeue.saturating_sub(self.dequeue);
            debug!(
                from = self.dequeue,
                to = contents.effective_dequeue,
                "ring reader missed data"
            );
            self.missed += skipped;
        }
        self.dequeue = contents.new_dequeue;
        Ok(contents)
    }
}

// ---------------------------------------------------------------------------
// hw
// ---------------------------------------------------------------------------

pub struct HwDevice {
    lane: Lane,
    codec: HwCodec,
}

impl HwDevice {
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            codec: HwCodec,
        }
    }

    async fn ask(&self, req: HwRequest) -> ClientResult<HwResponse> {
        match request(&self.lane, &self.codec, &req).await? {
            HwResponse::Error(status) => Err(ClientError::Rejected(status)),
            other => Ok(other),
        }
    }

    async fn done(&self, req: HwRequest) -> ClientResult<()> {
        match self.ask(req).await? {
            HwResponse::Done => Ok(()),
            _ => Err(ClientError::Unexpected("acknowledgement")),
        }
    }

    async fn word(&self, req: HwRequest) -> ClientResult<u32> {
        match self.ask(req).await? {
            HwResponse::Word(word) => Ok(word),
            _ => Err(ClientError::Unexpected("config space word")),
        }
    }

    /// Runs an exchange whose successful response carries one descriptor.
    ///
    /// The response head and tail are fully received and checked before the
    /// descriptor is pulled; rejected requests carry none.
    async fn descriptor(&self, req: HwRequest) -> ClientResult<Descriptor> {
        let message = self.codec.encode_request(&req)?;
        let mut exchange = Exchange::send_request(&self.lane, &message)?;
        let reply = exchange.receive_message().await?;
        match self.codec.decode_response(&reply)? {
            HwResponse::Done => {}
            HwResponse::Error(status) => return Err(ClientError::Rejected(status)),
            _ => return Err(ClientError::Unexpected("acknowledgement")),
        }
        let mut descriptors = exchange
            .pull_descriptors(req.attached_descriptors())
            .await?;
        descriptors
            .pop()
            .ok_or(ClientError::Unexpected("descriptor"))
    }

    pub async fn get_pci_info(&self) -> ClientResult<PciInfo> {
        match self.ask(HwRequest::GetPciInfo).await? {
            HwResponse::PciInfo(info) => Ok(info),
            _ => Err(ClientError::Unexpected("pci info")),
        }
    }

    pub async fn access_bar(&self, index: u32) -> ClientResult<MemoryRegion> {
        self.descriptor(HwRequest::AccessBar { index })
            .await?
            .into_memory()
            .map_err(|_| ClientError::Unexpected("memory descriptor"))
    }

    pub async fn access_irq(&self, index: u32) -> ClientResult<IrqLine> {
        self.descriptor(HwRequest::AccessIrq { index })
            .await?
            .into_irq()
            .map_err(|_| ClientError::Unexpected("irq descriptor"))
    }

    pub async fn install_msi(&self, index: u32) -> ClientResult<IrqLine> {
        self.descriptor(HwRequest::InstallMsi { index })
            .await?
            .into_irq()
            .map_err(|_| ClientError::Unexpected("irq descriptor"))
    }

    pub async fn claim_device(&self) -> ClientResult<()> {
        self.done(HwRequest::ClaimDevice).await
    }

    pub async fn enable_bus_irq(&self) -> ClientResult<()> {
        self.done(HwRequest::EnableBusIrq).await
    }

    pub async fn enable_msi(&self) -> ClientResult<()> {
        self.done(HwRequest::EnableMsi).await
    }

    pub async fn enable_busmaster(&self) -> ClientResult<()> {
        self.done(HwRequest::EnableBusmaster).await
    }

    pub async fn load_pci_space(&self, offset: u32, size: u32) -> ClientResult<u32> {
        self.word(HwRequest::LoadPciSpace { offset, size }).await
    }

    pub async fn store_pci_space(&self, offset: u32, size: u32, word: u32) -> ClientResult<()> {
        self.done(HwRequest::StorePciSpace { offset, size, word })
            .await
    }

    pub async fn load_pci_capability(
        &self,
        index: u32,
        offset: u32,
        size: u32,
    ) -> ClientResult<u32> {
        self.word(HwRequest::LoadPciCapability {
            index,
            offset,
            size,
        })
        .await
    }
}
