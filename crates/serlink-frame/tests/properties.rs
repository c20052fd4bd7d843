use bytes::BytesMut;
use proptest::prelude::*;
use serlink_frame::{
    checksum, encode_frame, is_reserved, DecodedFrame, FrameDecoder, ESCAPE, HEADER, TAIL,
};

fn wire(payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_frame(payload, &mut buf).unwrap();
    buf.to_vec()
}

fn decode_all(bytes: &[u8]) -> Vec<DecodedFrame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for &b in bytes {
        decoder.decode(b);
        if let Some(frame) = decoder.take_frame() {
            frames.push(frame);
        }
    }
    frames
}

fn stuffed_len(b: u8) -> usize {
    if is_reserved(b) {
        2
    } else {
        1
    }
}

fn stuff(out: &mut Vec<u8>, b: u8) {
    if is_reserved(b) {
        out.push(ESCAPE);
        out.push(b.wrapping_add(ESCAPE));
    } else {
        out.push(b);
    }
}

fn payload_byte() -> impl Strategy<Value = u8> {
    prop_oneof![Just(TAIL), Just(HEADER), Just(ESCAPE), any::<u8>()]
}

fn plain_byte() -> impl Strategy<Value = u8> {
    any::<u8>().prop_filter("unreserved", |b| !is_reserved(*b))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn roundtrip_any_payload(payload in prop::collection::vec(payload_byte(), 1..=4095)) {
        let frames = decode_all(&wire(&payload));
        prop_assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        prop_assert_eq!(frame.command_id, payload[0]);
        prop_assert_eq!(frame.parameters.as_ref(), &payload[1..]);
        prop_assert!(frame.valid);
    }

    #[test]
    fn back_to_back_frames_decode_in_order(
        payloads in prop::collection::vec(prop::collection::vec(payload_byte(), 1..32), 1..8)
    ) {
        let stream: Vec<u8> = payloads.iter().flat_map(|p| wire(p)).collect();
        let frames = decode_all(&stream);
        prop_assert_eq!(frames.len(), payloads.len());
        for (frame, payload) in frames.iter().zip(&payloads) {
            prop_assert_eq!(&frame.payload(), payload);
            prop_assert!(frame.valid);
        }
    }

    // Bit flips are placed on unreserved values so the corrupted byte is
    // not itself read as an escape or frame delimiter. Length corruption
    // has a narrower guarantee, see the tests at the end of this file.
    #[test]
    fn payload_bit_flip_is_detected(
        payload in prop::collection::vec(plain_byte(), 1..64),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let i = index.index(payload.len());
        let flipped = payload[i] ^ (1 << bit);
        prop_assume!(!is_reserved(flipped));

        let len = payload.len() as u16;
        let [len_h, len_l] = len.to_be_bytes();
        let mut bytes = wire(&payload);
        let offset = 1 + stuffed_len(len_h) + stuffed_len(len_l) + i;
        bytes[offset] = flipped;

        let frames = decode_all(&bytes);
        prop_assert!(frames.iter().all(|f| !f.valid));
    }

    #[test]
    fn ctrl_bit_flip_is_detected(
        payload in prop::collection::vec(plain_byte(), 1..64),
        bit in 0u8..8,
    ) {
        let ctrl = checksum(payload.len() as u16, &payload);
        prop_assume!(!is_reserved(ctrl));
        let flipped = ctrl ^ (1 << bit);
        prop_assume!(!is_reserved(flipped));

        let mut bytes = wire(&payload);
        let ctrl_index = bytes.len() - 2;
        prop_assert_eq!(bytes[ctrl_index], ctrl);
        bytes[ctrl_index] = flipped;

        let frames = decode_all(&bytes);
        prop_assert_eq!(frames.len(), 1);
        prop_assert!(!frames[0].valid);
    }

    #[test]
    fn length_bit_flip_without_escapes_yields_no_valid_frame(
        payload in prop::collection::vec(plain_byte(), 1..64),
        high in any::<bool>(),
        bit in 0u8..8,
    ) {
        let ctrl = checksum(payload.len() as u16, &payload);
        prop_assume!(!is_reserved(ctrl));
        let [len_h, len_l] = (payload.len() as u16).to_be_bytes();
        prop_assume!(!is_reserved(len_h) && !is_reserved(len_l));

        let mut bytes = wire(&payload);
        let index = if high { 1 } else { 2 };
        let flipped = bytes[index] ^ (1 << bit);
        prop_assume!(!is_reserved(flipped));
        bytes[index] = flipped;

        prop_assert!(decode_all(&bytes).iter().all(|f| !f.valid));
    }

    #[test]
    fn invalid_length_never_yields_a_frame(
        len in prop_oneof![Just(0u16), 4096u16..=u16::MAX],
        trailing in prop::collection::vec(
            any::<u8>().prop_filter("no frame start", |b| *b != HEADER && *b != ESCAPE),
            0..64,
        ),
    ) {
        let [len_h, len_l] = len.to_be_bytes();
        let mut bytes = vec![HEADER];
        stuff(&mut bytes, len_h);
        stuff(&mut bytes, len_l);
        bytes.extend(&trailing);

        prop_assert!(decode_all(&bytes).is_empty());
    }

    #[test]
    fn unread_frame_is_never_overwritten(
        first in prop::collection::vec(payload_byte(), 1..32),
        second in prop::collection::vec(payload_byte(), 1..32),
    ) {
        let mut decoder = FrameDecoder::new();
        for b in wire(&first).into_iter().chain(wire(&second)) {
            decoder.decode(b);
        }
        let frame = decoder.take_frame().unwrap();
        prop_assert_eq!(frame.payload(), first);
        prop_assert!(decoder.take_frame().is_none());
    }
}

// The tail check compares the un-stuffed byte, so a corrupted length can
// end a frame early on an escaped 0x04 inside the body. When the bytes
// taken as CTRL happen to balance the checksum, the truncated frame is
// reported valid.
#[test]
fn length_flip_onto_escaped_tail_passes_as_valid() {
    let mut bytes = wire(&[0x10, 0xEF, 0x04]);
    assert_eq!(
        bytes,
        [0x05, 0x00, 0x03, 0x10, 0xEF, 0x06, 0x0A, 0xFA, 0x04]
    );

    // LEN 3 -> 1: payload [10], CTRL read as EF, tail as un-stuffed 06 0A.
    bytes[2] ^= 0b10;
    let frames = decode_all(&bytes);
    assert_eq!(frames, vec![DecodedFrame::new(0x10, Vec::<u8>::new(), true)]);
}
