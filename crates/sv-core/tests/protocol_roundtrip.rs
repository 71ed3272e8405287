//! Integration tests for the sv-core protocol codec.
//!
//! These tests drive the public API the way the transport does: encode a
//! frame, decode its header with a receiver-chosen limit, slice the payload,
//! and reinterpret it.

use sv_core::{
    decode_header, encode_frame, encode_header,
    protocol::messages::{FixedPayload, KeyboardEventData, MouseEventData},
    BorrowedMessage, FrameError, FrameHeader, MessageKind, OwnedMessage, HEADER_SIZE,
};

/// Encodes a message as one frame and decodes it back, asserting the header
/// describes the payload exactly.
fn roundtrip(message: &OwnedMessage, limit: usize) -> OwnedMessage {
    let frame = encode_frame(message.kind, &message.content);
    let header = decode_header(&frame, limit).expect("decode must succeed");
    assert_eq!(HEADER_SIZE + header.length, frame.len(), "header must describe payload");
    BorrowedMessage::new(header.kind, &frame[HEADER_SIZE..]).to_owned_message()
}

#[test]
fn test_roundtrip_login_message() {
    let original = OwnedMessage::new(
        MessageKind::Login,
        r#"{"email":"viewer@example.com","password":"hunter2"}"#,
    );
    assert_eq!(original, roundtrip(&original, 1000));
}

#[test]
fn test_roundtrip_empty_control_messages() {
    for kind in [
        MessageKind::RegisterStreamer,
        MessageKind::StartStream,
        MessageKind::Ack,
        MessageKind::Nack,
    ] {
        let original = OwnedMessage::empty(kind);
        assert_eq!(original, roundtrip(&original, 0));
    }
}

#[test]
fn test_roundtrip_id_carries_raw_code() {
    let original = OwnedMessage::new(MessageKind::Id, "aZ09bY18cX");
    let decoded = roundtrip(&original, 64);
    assert_eq!(decoded.text(), "aZ09bY18cX");
}

#[test]
fn test_roundtrip_mouse_input_payload() {
    let event = MouseEventData {
        button_mask: 1 | 32,
        x: 640,
        y: 360,
    };
    let decoded = roundtrip(&OwnedMessage::new(MessageKind::MouseInput, event.to_bytes()), 64);
    assert_eq!(decoded.as_borrowed().convert_to::<MouseEventData>().unwrap(), event);
}

#[test]
fn test_roundtrip_keyboard_input_payload() {
    let event = KeyboardEventData {
        down: false,
        key: 0xFF0D,
    };
    let decoded = roundtrip(&OwnedMessage::new(MessageKind::KeyboardInput, event.to_bytes()), 64);
    assert_eq!(
        decoded.as_borrowed().convert_to::<KeyboardEventData>().unwrap(),
        event
    );
}

#[test]
fn test_mouse_payload_sent_as_keyboard_is_a_type_mismatch() {
    let event = MouseEventData::default();
    let decoded = roundtrip(&OwnedMessage::new(MessageKind::KeyboardInput, event.to_bytes()), 64);
    let err = decoded.as_borrowed().convert_to::<KeyboardEventData>().unwrap_err();
    assert_eq!(err.expected, KeyboardEventData::SIZE);
    assert_eq!(err.actual, MouseEventData::SIZE);
}

#[test]
fn test_payload_one_byte_over_limit_is_rejected() {
    let frame = encode_frame(MessageKind::ScreenUpdate, &[0xAB; 1001]);
    assert!(matches!(
        decode_header(&frame, 1000),
        Err(FrameError::TooLong { declared: 1001, max: 1000 })
    ));
}

#[test]
fn test_truncated_header_is_rejected_at_every_length() {
    let bytes = encode_header(&FrameHeader {
        length: 5,
        kind: MessageKind::Response,
    });
    for len in 0..HEADER_SIZE {
        assert!(
            matches!(decode_header(&bytes[..len], 100), Err(FrameError::InsufficientData { .. })),
            "prefix of {len} bytes must fail"
        );
    }
}
