//! Wire coverage for the kerncfg, byte-ring and hw codecs.

use service_abi::{
    BarInfo, BufferContents, BufferContentsRequest, ByteRingRequest, ByteRingResponse, GetFlags,
    HwRequest, HwResponse, IoType, KerncfgRequest, KerncfgResponse, PciCapability, PciInfo,
    Status,
};
use transport_codecs::schema::{byte_ring, hw, kerncfg};
use transport_codecs::{ByteRingCodec, HwCodec, KerncfgCodec};
use transport_fabric::{Codec, FabricError, Message};

#[test]
fn kind_ids_are_stable() {
    assert_eq!(kerncfg::GET_CMDLINE, 0x0100);
    assert_eq!(byte_ring::GET_BUFFER_CONTENTS, 0x0110);
    assert_eq!(hw::GET_PCI_INFO, 0x0200);
    assert_eq!(hw::SVR_RESPONSE, 0x02FF);
}

#[test]
fn fieldless_requests_have_empty_heads() {
    let codec = KerncfgCodec;
    let message = codec.encode_request(&KerncfgRequest::GetNumCpu).unwrap();
    assert_eq!(message.kind, kerncfg::GET_NUM_CPU);
    assert!(message.head.is_empty());
    assert!(message.tail.is_empty());
    assert_eq!(
        codec.decode_request(&message).unwrap(),
        Some(KerncfgRequest::GetNumCpu)
    );
}

#[test]
fn unknown_kind_decodes_to_none() {
    let unknown = Message::new(0xFFFF, vec![1, 2, 3]);
    assert_eq!(KerncfgCodec.decode_request(&unknown).unwrap(), None);
    assert_eq!(ByteRingCodec.decode_request(&unknown).unwrap(), None);
    assert_eq!(HwCodec.decode_request(&unknown).unwrap(), None);
}

#[test]
fn cmdline_travels_in_the_tail() {
    let codec = KerncfgCodec;
    let response = KerncfgResponse::Cmdline("console=serial quiet".into());
    let message = codec.encode_response(&response).unwrap();
    assert_eq!(message.tail, b"console=serial quiet");
    assert_eq!(codec.decode_response(&message).unwrap(), response);
}

#[test]
fn cmdline_size_mismatch_is_a_protocol_violation() {
    let codec = KerncfgCodec;
    let mut message = codec
        .encode_response(&KerncfgResponse::Cmdline("abc".into()))
        .unwrap();
    message.tail.push(b'd');
    let err = codec.decode_response(&message).unwrap_err();
    assert!(matches!(err, FabricError::ProtocolViolation(_)));
}

#[test]
fn illegal_request_round_trips_as_status() {
    let codec = HwCodec;
    let message = codec.encode_response(&codec.illegal_request()).unwrap();
    assert_eq!(
        codec.decode_response(&message).unwrap(),
        HwResponse::Error(Status::IllegalRequest)
    );
}

#[test]
fn malformed_head_is_a_protocol_violation() {
    let bogus = Message::new(hw::ACCESS_BAR, vec![0xFF]);
    let err = HwCodec.decode_request(&bogus).unwrap_err();
    assert!(matches!(err, FabricError::ProtocolViolation(_)));

    let bogus = Message::new(kerncfg::SVR_RESPONSE, vec![]);
    let err = KerncfgCodec.decode_response(&bogus).unwrap_err();
    assert!(matches!(err, FabricError::ProtocolViolation(_)));
}

#[test]
fn response_of_wrong_kind_is_a_protocol_violation() {
    let message = KerncfgCodec
        .encode_response(&KerncfgResponse::NumCpu(4))
        .unwrap();
    let err = HwCodec.decode_response(&message).unwrap_err();
    assert!(matches!(err, FabricError::ProtocolViolation(_)));
}

#[test]
fn buffer_contents_carry_cursors_and_flags() {
    let codec = ByteRingCodec;
    let request = ByteRingRequest::GetBufferContents(BufferContentsRequest {
        size: 4096,
        dequeue: 1 << 40,
        watermark: 128,
        flags: GetFlags::NO_WAIT | GetFlags::ONE_RECORD,
    });
    let message = codec.encode_request(&request).unwrap();
    assert_eq!(codec.decode_request(&message).unwrap(), Some(request));

    let response = ByteRingResponse::Contents(BufferContents {
        status: Status::WouldBlock,
        data: Vec::new(),
        effective_dequeue: 64,
        new_dequeue: 64,
        missed: true,
        truncated: false,
    });
    let message = codec.encode_response(&response).unwrap();
    assert_eq!(codec.decode_response(&message).unwrap(), response);
}

#[test]
fn pci_info_tail_round_trips() {
    let codec = HwCodec;
    let info = PciInfo {
        bars: vec![
            BarInfo {
                io_type: IoType::Memory,
                address: 0xFEB0_0000,
                length: 0x1000,
                offset: 0,
            },
            BarInfo::default(),
        ],
        capabilities: vec![PciCapability {
            kind: 0x05,
            offset: 0x50,
            length: 0x18,
        }],
        num_msis: 4,
    };
    let message = codec.encode_response(&HwResponse::PciInfo(info.clone())).unwrap();
    assert!(!message.tail.is_empty());
    assert_eq!(
        codec.decode_response(&message).unwrap(),
        HwResponse::PciInfo(info)
    );

    let store = HwRequest::StorePciSpace {
        offset: 0x04,
        size: 2,
        word: 0x0006,
    };
    let message = codec.encode_request(&store).unwrap();
    assert_eq!(codec.decode_request(&message).unwrap(), Some(store));
}
