//! Wire framing edge cases beyond the per-module round-trip tests: decoding
//! a header at an unaligned offset inside a larger buffer, and malformed
//! `SET_KEY` / `ENCRYPTED_MESSAGE` envelopes (§4.4, §6).

use overlaycore::envelope::SetKeyEnvelope;
use overlaycore::protocol::{message_type, MessageHeader};

#[test]
fn header_decodes_correctly_at_an_unaligned_buffer_offset() {
    // One stray byte ahead of the header, as a batch's inner messages might
    // leave a header starting on an odd offset.
    let mut buf = vec![0xFFu8];
    let header = MessageHeader {
        size: 4660,
        message_type: message_type::PING,
    };
    header.encode(&mut buf);
    let decoded = MessageHeader::decode(&buf[1..]).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn set_key_decode_rejects_a_body_shorter_than_the_fixed_region() {
    let body = vec![0u8; 19];
    assert!(SetKeyEnvelope::decode(&body).is_err());
}

#[test]
fn set_key_decode_rejects_a_body_truncated_inside_the_encrypted_key() {
    let target = [1u8; 32];
    let envelope = SetKeyEnvelope::build(0, 1, vec![1, 2, 3, 4, 5, 6, 7, 8], target, |_| Ok(vec![0xAB; 256])).unwrap();
    let mut encoded = envelope.encode();
    // Truncate a few bytes out of the middle of the body, after the header.
    encoded.truncate(encoded.len() - 20);
    let body = &encoded[MessageHeader::WIRE_SIZE..];
    assert!(SetKeyEnvelope::decode(body).is_err());
}

#[test]
fn set_key_fixed_field_validation_rejects_wrong_target() {
    let target = [1u8; 32];
    let envelope = SetKeyEnvelope::build(0, 1, vec![1, 2, 3, 4], target, |_| Ok(vec![0xAB; 256])).unwrap();
    let our_identity = [2u8; 32];
    assert!(envelope.validate_fixed_fields(4, &our_identity).is_err());
}

#[test]
fn set_key_fixed_field_validation_rejects_wrong_purpose_size() {
    let target = [1u8; 32];
    let envelope = SetKeyEnvelope::build(0, 1, vec![1, 2, 3, 4], target, |_| Ok(vec![0xAB; 256])).unwrap();
    assert!(envelope.validate_fixed_fields(999, &target).is_err());
}
