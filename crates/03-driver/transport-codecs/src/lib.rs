//! Codec implementations for the kerncfg, byte-ring and hw protocols.
//!
//! Each codec maps the typed requests and responses from `service-abi` onto
//! [`Message`]s: a kind id, an rkyv-archived head and, where the payload is
//! variable sized, a tail. Heads that fail validation, and status codes this
//! build does not know, are protocol violations.

#![allow(missing_docs)]

pub mod schema;

use rkyv::{
    api::high::{access, to_bytes, HighSerializer, HighValidator},
    bytecheck::CheckBytes,
    rancor::Error,
    ser::allocator::ArenaHandle,
    util::AlignedVec,
    Archive, Serialize,
};
use service_abi::{
    BarInfo, BufferContents, BufferContentsRequest, ByteRingRequest, ByteRingResponse, GetFlags,
    HwRequest, HwResponse, IoType, KerncfgRequest, KerncfgResponse, MemoryInformation,
    PciCapability, PciInfo, Status,
};
use transport_fabric::{Codec, FabricError, FabricResult, Message};

use schema::*;

/// Codec for the kernel configuration object.
#[derive(Clone, Copy, Debug, Default)]
pub struct KerncfgCodec;

impl Codec for KerncfgCodec {
    type Request = KerncfgRequest;
    type Response = KerncfgResponse;

    fn encode_request(&self, request: &Self::Request) -> FabricResult<Message> {
        let kind = match request {
            KerncfgRequest::GetCmdline => kerncfg::GET_CMDLINE,
            KerncfgRequest::GetMemoryInformation => kerncfg::GET_MEMORY_INFORMATION,
            KerncfgRequest::GetNumCpu => kerncfg::GET_NUM_CPU,
        };
        Ok(Message::new(kind, Vec::new()))
    }

    fn decode_request(&self, message: &Message) -> FabricResult<Option<Self::Request>> {
        Ok(match message.kind {
            kerncfg::GET_CMDLINE => Some(KerncfgRequest::GetCmdline),
            kerncfg::GET_MEMORY_INFORMATION => Some(KerncfgRequest::GetMemoryInformation),
            kerncfg::GET_NUM_CPU => Some(KerncfgRequest::GetNumCpu),
            _ => None,
        })
    }

    fn encode_response(&self, response: &Self::Response) -> FabricResult<Message> {
        let (head, tail) = match response {
            KerncfgResponse::Cmdline(cmdline) => (
                KerncfgResponseV1::Cmdline {
                    size: len_u32(cmdline.len())?,
                },
                cmdline.as_bytes().to_vec(),
            ),
            KerncfgResponse::MemoryInformation(info) => (
                KerncfgResponseV1::MemoryInformation {
                    total_usable_memory: info.total_usable_memory,
                    available_memory: info.available_memory,
                    memory_unit: info.memory_unit,
                },
                Vec::new(),
            ),
            KerncfgResponse::NumCpu(num_cpu) => {
                (KerncfgResponseV1::NumCpu { num_cpu: *num_cpu }, Vec::new())
            }
            KerncfgResponse::Error(status) => (
                KerncfgResponseV1::Error {
                    status: status.code(),
                },
                Vec::new(),
            ),
        };
        Ok(Message::new(kerncfg::SVR_RESPONSE, serialize(&head)?).with_tail(tail))
    }

    fn decode_response(&self, message: &Message) -> FabricResult<Self::Response> {
        ensure_kind(message, kerncfg::SVR_RESPONSE)?;
        with_archived::<KerncfgResponseV1, _>(&message.head, |archived| {
            Ok(match archived {
                ArchivedKerncfgResponseV1::Cmdline { size } => {
                    ensure_tail(message, size.to_native())?;
                    let cmdline = String::from_utf8(message.tail.clone()).map_err(|_| {
                        FabricError::protocol("kernel command line is not valid UTF-8")
                    })?;
                    KerncfgResponse::Cmdline(cmdline)
                }
                ArchivedKerncfgResponseV1::MemoryInformation {
                    total_usable_memory,
                    available_memory,
                    memory_unit,
                } => KerncfgResponse::MemoryInformation(MemoryInformation {
                    total_usable_memory: total_usable_memory.to_native(),
                    available_memory: available_memory.to_native(),
                    memory_unit: memory_unit.to_native(),
                }),
                ArchivedKerncfgResponseV1::NumCpu { num_cpu } => {
                    KerncfgResponse::NumCpu(num_cpu.to_native())
                }
                ArchivedKerncfgResponseV1::Error { status } => {
                    KerncfgResponse::Error(decode_status(status.to_native())?)
                }
            })
        })
    }

    fn illegal_request(&self) -> Self::Response {
        KerncfgResponse::Error(Status::IllegalRequest)
    }
}

/// Codec for byte-ring objects.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByteRingCodec;

impl Codec for ByteRingCodec {
    type Request = ByteRingRequest;
    type Response = ByteRingResponse;

    fn encode_request(&self, request: &Self::Request) -> FabricResult<Message> {
        let ByteRingRequest::GetBufferContents(req) = request;
        let head = serialize(&BufferContentsRequestV1 {
            size: req.size,
            dequeue: req.dequeue,
            watermark: req.watermark,
            flags: req.flags.bits(),
        })?;
        Ok(Message::new(byte_ring::GET_BUFFER_CONTENTS, head))
    }

    fn decode_request(&self, message: &Message) -> FabricResult<Option<Self::Request>> {
        if message.kind != byte_ring::GET_BUFFER_CONTENTS {
            return Ok(None);
        }
        with_archived::<BufferContentsRequestV1, _>(&message.head, |archived| {
            let bits = archived.flags.to_native();
            let flags = GetFlags::from_bits(bits).ok_or_else(|| {
                FabricError::protocol(format!("unknown byte-ring flags {bits:#x}"))
            })?;
            Ok(Some(ByteRingRequest::GetBufferContents(
                BufferContentsRequest {
                    size: archived.size.to_native(),
                    dequeue: archived.dequeue.to_native(),
                    watermark: archived.watermark.to_native(),
                    flags,
                },
            )))
        })
    }

    fn encode_response(&self, response: &Self::Response) -> FabricResult<Message> {
        let (head, tail) = match response {
            ByteRingResponse::Contents(contents) => (
                ByteRingResponseV1::Contents {
                    status: contents.status.code(),
                    effective_dequeue: contents.effective_dequeue,
                    new_dequeue: contents.new_dequeue,
                    missed: contents.missed,
                    truncated: contents.truncated,
                },
                contents.data.clone(),
            ),
            ByteRingResponse::Error(status) => (
                ByteRingResponseV1::Error {
                    status: status.code(),
                },
                Vec::new(),
            ),
        };
        Ok(Message::new(byte_ring::SVR_RESPONSE, serialize(&head)?).with_tail(tail))
    }

    fn decode_response(&self, message: &Message) -> FabricResult<Self::Response> {
        ensure_kind(message, byte_ring::SVR_RESPONSE)?;
        with_archived::<ByteRingResponseV1, _>(&message.head, |archived| {
            Ok(match archived {
                ArchivedByteRingResponseV1::Contents {
                    status,
                    effective_dequeue,
                    new_dequeue,
                    missed,
                    truncated,
                } => ByteRingResponse::Contents(BufferContents {
                    status: decode_status(status.to_native())?,
                    data: message.tail.clone(),
                    effective_dequeue: effective_dequeue.to_native(),
                    new_dequeue: new_dequeue.to_native(),
                    missed: *missed,
                    truncated: *truncated,
                }),
                ArchivedByteRingResponseV1::Error { status } => {
                    ByteRingResponse::Error(decode_status(status.to_native())?)
                }
            })
        })
    }

    fn illegal_request(&self) -> Self::Response {
        ByteRingResponse::Error(Status::IllegalRequest)
    }
}

/// Codec for hardware device objects.
#[derive(Clone, Copy, Debug, Default)]
pub struct HwCodec;

impl Codec for HwCodec {
    type Request = HwRequest;
    type Response = HwResponse;

    fn encode_request(&self, request: &Self::Request) -> FabricResult<Message> {
        let message = match *request {
            HwRequest::GetPciInfo => Message::new(hw::GET_PCI_INFO, Vec::new()),
            HwRequest::AccessBar { index } => {
                Message::new(hw::ACCESS_BAR, serialize(&IndexV1 { index })?)
            }
            HwRequest::AccessIrq { index } => {
                Message::new(hw::ACCESS_IRQ, serialize(&IndexV1 { index })?)
            }
            HwRequest::InstallMsi { index } => {
                Message::new(hw::INSTALL_MSI, serialize(&IndexV1 { index })?)
            }
            HwRequest::ClaimDevice => Message::new(hw::CLAIM_DEVICE, Vec::new()),
            HwRequest::EnableBusIrq => Message::new(hw::ENABLE_BUS_IRQ, Vec::new()),
            HwRequest::EnableMsi => Message::new(hw::ENABLE_MSI, Vec::new()),
            HwRequest::EnableBusmaster => Message::new(hw::ENABLE_BUSMASTER, Vec::new()),
            HwRequest::LoadPciSpace { offset, size } => Message::new(
                hw::LOAD_PCI_SPACE,
                serialize(&PciSpaceV1 {
                    offset,
                    size,
                    word: 0,
                })?,
            ),
            HwRequest::StorePciSpace { offset, size, word } => Message::new(
                hw::STORE_PCI_SPACE,
                serialize(&PciSpaceV1 { offset, size, word })?,
            ),
            HwRequest::LoadPciCapability {
                index,
                offset,
                size,
            } => Message::new(
                hw::LOAD_PCI_CAPABILITY,
                serialize(&PciCapabilitySpaceV1 {
                    index,
                    offset,
                    size,
                })?,
            ),
        };
        Ok(message)
    }

    fn decode_request(&self, message: &Message) -> FabricResult<Option<Self::Request>> {
        let head = &message.head;
        let request = match message.kind {
            hw::GET_PCI_INFO => HwRequest::GetPciInfo,
            hw::ACCESS_BAR => HwRequest::AccessBar {
                index: decode_index(head)?,
            },
            hw::ACCESS_IRQ => HwRequest::AccessIrq {
                index: decode_index(head)?,
            },
            hw::INSTALL_MSI => HwRequest::InstallMsi {
                index: decode_index(head)?,
            },
            hw::CLAIM_DEVICE => HwRequest::ClaimDevice,
            hw::ENABLE_BUS_IRQ => HwRequest::EnableBusIrq,
            hw::ENABLE_MSI => HwRequest::EnableMsi,
            hw::ENABLE_BUSMASTER => HwRequest::EnableBusmaster,
            hw::LOAD_PCI_SPACE => with_archived::<PciSpaceV1, _>(head, |space| {
                Ok(HwRequest::LoadPciSpace {
                    offset: space.offset.to_native(),
                    size: space.size.to_native(),
                })
            })?,
            hw::STORE_PCI_SPACE => with_archived::<PciSpaceV1, _>(head, |space| {
                Ok(HwRequest::StorePciSpace {
                    offset: space.offset.to_native(),
                    size: space.size.to_native(),
                    word: space.word.to_native(),
                })
            })?,
            hw::LOAD_PCI_CAPABILITY => with_archived::<PciCapabilitySpaceV1, _>(head, |space| {
                Ok(HwRequest::LoadPciCapability {
                    index: space.index.to_native(),
                    offset: space.offset.to_native(),
                    size: space.size.to_native(),
                })
            })?,
            _ => return Ok(None),
        };
        Ok(Some(request))
    }

    fn encode_response(&self, response: &Self::Response) -> FabricResult<Message> {
        let (head, tail) = match response {
            HwResponse::PciInfo(info) => {
                let tail = PciInfoTailV1 {
                    bars: info
                        .bars
                        .iter()
                        .map(|bar| BarV1 {
                            io_type: encode_io_type(bar.io_type),
                            address: bar.address,
                            length: bar.length,
                            offset: bar.offset,
                        })
                        .collect(),
                    capabilities: info
                        .capabilities
                        .iter()
                        .map(|cap| CapabilityV1 {
                            kind: cap.kind,
                            offset: cap.offset,
                            length: cap.length,
                        })
                        .collect(),
                };
                (
                    HwResponseV1::PciInfo {
                        num_msis: info.num_msis,
                    },
                    serialize(&tail)?,
                )
            }
            HwResponse::Done => (HwResponseV1::Done, Vec::new()),
            HwResponse::Word(word) => (HwResponseV1::Word { word: *word }, Vec::new()),
            HwResponse::Error(status) => (
                HwResponseV1::Error {
                    status: status.code(),
                },
                Vec::new(),
            ),
        };
        Ok(Message::new(hw::SVR_RESPONSE, serialize(&head)?).with_tail(tail))
    }

    fn decode_response(&self, message: &Message) -> FabricResult<Self::Response> {
        ensure_kind(message, hw::SVR_RESPONSE)?;
        with_archived::<HwResponseV1, _>(&message.head, |archived| match archived {
            ArchivedHwResponseV1::PciInfo { num_msis } => {
                let num_msis = num_msis.to_native();
                with_archived::<PciInfoTailV1, _>(&message.tail, |tail| {
                    let bars = tail
                        .bars
                        .iter()
                        .map(|bar| {
                            Ok(BarInfo {
                                io_type: decode_io_type(bar.io_type)?,
                                address: bar.address.to_native(),
                                length: bar.length.to_native(),
                                offset: bar.offset.to_native(),
                            })
                        })
                        .collect::<FabricResult<Vec<_>>>()?;
                    let capabilities = tail
                        .capabilities
                        .iter()
                        .map(|cap| PciCapability {
                            kind: cap.kind,
                            offset: cap.offset.to_native(),
                            length: cap.length.to_native(),
                        })
                        .collect();
                    Ok(HwResponse::PciInfo(PciInfo {
                        bars,
                        capabilities,
                        num_msis,
                    }))
                })
            }
            ArchivedHwResponseV1::Done => Ok(HwResponse::Done),
            ArchivedHwResponseV1::Word { word } => Ok(HwResponse::Word(word.to_native())),
            ArchivedHwResponseV1::Error { status } => {
                Ok(HwResponse::Error(decode_status(status.to_native())?))
            }
        })
    }

    fn illegal_request(&self) -> Self::Response {
        HwResponse::Error(Status::IllegalRequest)
    }
}

fn decode_index(head: &[u8]) -> FabricResult<u32> {
    with_archived::<IndexV1, _>(head, |index| Ok(index.index.to_native()))
}

fn encode_io_type(io_type: IoType) -> u8 {
    match io_type {
        IoType::None => 0,
        IoType::Port => 1,
        IoType::Memory => 2,
    }
}

fn decode_io_type(raw: u8) -> FabricResult<IoType> {
    match raw {
        0 => Ok(IoType::None),
        1 => Ok(IoType::Port),
        2 => Ok(IoType::Memory),
        other => Err(FabricError::protocol(format!("illegal BAR io type {other}"))),
    }
}

fn decode_status(code: u32) -> FabricResult<Status> {
    Status::from_code(code)
        .ok_or_else(|| FabricError::protocol(format!("unknown status code {code}")))
}

fn ensure_kind(message: &Message, expected: u32) -> FabricResult<()> {
    if message.kind != expected {
        return Err(FabricError::protocol(format!(
            "unexpected message kind {:#x} (expected {:#x})",
            message.kind, expected
        )));
    }
    Ok(())
}

fn ensure_tail(message: &Message, announced: u32) -> FabricResult<()> {
    if message.tail.len() != announced as usize {
        return Err(FabricError::protocol(format!(
            "head announced {announced} tail bytes, message carries {}",
            message.tail.len()
        )));
    }
    Ok(())
}

fn len_u32(len: usize) -> FabricResult<u32> {
    u32::try_from(len).map_err(|_| FabricError::codec("payload exceeds u32::MAX bytes"))
}

fn serialize<T>(value: &T) -> FabricResult<Vec<u8>>
where
    T: Archive,
    T: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, Error>>,
{
    to_bytes::<Error>(value)
        .map(|aligned| aligned.into_vec())
        .map_err(|err| FabricError::codec(format!("serialize failure: {err}")))
}

/// Validates `payload` as an archived `T` and hands it to `f`.
///
/// Payloads arrive in plain byte vectors, so they are copied into an aligned
/// buffer before validation.
fn with_archived<T, R>(
    payload: &[u8],
    f: impl FnOnce(&rkyv::Archived<T>) -> FabricResult<R>,
) -> FabricResult<R>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<HighValidator<'a, Error>>,
{
    let mut aligned = AlignedVec::<16>::with_capacity(payload.len());
    aligned.extend_from_slice(payload);
    let archived = access::<T::Archived, Error>(aligned.as_slice())
        .map_err(|err| FabricError::protocol(format!("validation failure: {err}")))?;
    f(archived)
}
