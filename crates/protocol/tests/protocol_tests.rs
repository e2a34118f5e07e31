//! Integration tests for the wire formats
//!
//! Covers the handshake contract, endian conversions, orientation remapping
//! and video framing as a phone would observe them.

use protocol::endian::{big_to_native, big_to_native_f32, native_to_big, native_to_big_f32};
use protocol::handshake::{TAG_FILL, tag_offsets};
use protocol::video::decode_length_header;
use protocol::{
    HANDSHAKE_FRAME_LEN, MAX_CHUNK_LEN, Orientation, ProtocolError, STREAM_TERMINATOR,
    ViewerParams, decode_orientation, encode_handshake, encode_length_header, encode_orientation,
    parse_handshake, read_video_frame,
};
use proptest::prelude::*;
use std::io::Cursor;

mod handshake {
    use super::*;

    #[test]
    fn test_reference_scenario() {
        let buf = [
            0x27, 0x28, 0, 0, 2, 0x80, 0x29, 0, 0, 1, 0xE0, 0x2A, 0, 0, 0, 0,
        ];
        let params = parse_handshake(&buf, HANDSHAKE_FRAME_LEN).expect("valid frame");
        assert_eq!(
            params,
            ViewerParams {
                width: 640,
                height: 480,
                interpupillary_distance: 0.0,
            }
        );
    }

    #[test]
    fn test_legacy_sequential_handshake_rejected() {
        // An older phone build sent bytes 0, 1, 2, ... with no tags.
        let buf: Vec<u8> = (0..HANDSHAKE_FRAME_LEN as u8).collect();
        assert!(matches!(
            parse_handshake(&buf, HANDSHAKE_FRAME_LEN),
            Err(ProtocolError::TagMismatch { offset: 0, .. })
        ));
    }

    #[test]
    fn test_longer_frame_requires_exact_length() {
        let params = ViewerParams {
            width: 1920,
            height: 1080,
            interpupillary_distance: 0.063,
        };
        let frame = encode_handshake(&params, 64);
        assert_eq!(frame.len(), 64);
        assert!(frame[16..].iter().all(|b| *b == TAG_FILL));
        assert_eq!(parse_handshake(&frame, 64).unwrap(), params);
        assert!(parse_handshake(&frame[..63], 64).is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_frames_decode(
            width in any::<i32>(),
            height in any::<i32>(),
            ipd in -1.0f32..1.0f32,
            extra in 0usize..48,
        ) {
            let params = ViewerParams { width, height, interpupillary_distance: ipd };
            let len = HANDSHAKE_FRAME_LEN + extra;
            let frame = encode_handshake(&params, len);
            prop_assert_eq!(parse_handshake(&frame, len).unwrap(), params);
        }

        #[test]
        fn prop_any_altered_tag_rejected(
            width in any::<i32>(),
            height in any::<i32>(),
            extra in 0usize..16,
            pick in any::<prop::sample::Index>(),
            delta in 1u8..=255,
        ) {
            let len = HANDSHAKE_FRAME_LEN + extra;
            let params = ViewerParams { width, height, interpupillary_distance: 0.064 };
            let mut frame = encode_handshake(&params, len);

            let offsets: Vec<usize> = tag_offsets(len).collect();
            let offset = offsets[pick.index(offsets.len())];
            frame[offset] = frame[offset].wrapping_add(delta);

            let is_tag_mismatch = matches!(
                parse_handshake(&frame, len),
                Err(ProtocolError::TagMismatch { offset: o, .. }) if o == offset
            );
            prop_assert!(is_tag_mismatch);
        }
    }
}

mod endian_roundtrip {
    use super::*;

    #[test]
    fn test_representative_values() {
        for v in [0u32, 1, 0x8000_0000, u32::MAX, 0x1234_5678] {
            assert_eq!(native_to_big(big_to_native(v)), v);
        }
        for v in [0i16, -1, i16::MIN, i16::MAX] {
            assert_eq!(big_to_native(native_to_big(v)), v);
        }
        for v in [0.0f32, -0.0, 1.5, f32::MAX, f32::MIN_POSITIVE, f32::INFINITY] {
            assert_eq!(
                native_to_big_f32(big_to_native_f32(v)).to_bits(),
                v.to_bits()
            );
        }
    }

    proptest! {
        #[test]
        fn prop_u64_roundtrip(v in any::<u64>()) {
            prop_assert_eq!(native_to_big(big_to_native(v)), v);
            prop_assert_eq!(native_to_big(v), v.to_be());
        }

        #[test]
        fn prop_i32_roundtrip(v in any::<i32>()) {
            prop_assert_eq!(big_to_native(native_to_big(v)), v);
        }

        #[test]
        fn prop_f32_bits_roundtrip(bits in any::<u32>()) {
            let v = f32::from_bits(bits);
            prop_assert_eq!(native_to_big_f32(big_to_native_f32(v)).to_bits(), bits);
            prop_assert_eq!(native_to_big_f32(v).to_ne_bytes(), v.to_be_bytes());
        }
    }
}

mod orientation {
    use super::*;

    #[test]
    fn test_device_default_frame() {
        // First frame the phone writes before its sensors report.
        let mut frame = Vec::new();
        for v in [0.04f32, 0.08, 0.15, 0.16] {
            frame.extend_from_slice(&v.to_be_bytes());
        }
        let o = decode_orientation(&frame).unwrap();
        assert_eq!(
            o,
            Orientation {
                x: 0.04,
                y: 0.15,
                z: 0.16,
                w: 0.08,
            }
        );
        assert_eq!(encode_orientation(&o).to_vec(), frame);
    }
}

mod video_stream {
    use super::*;

    #[test]
    fn test_stream_of_frames_then_terminator() {
        let payloads = [vec![0xFFu8; 10], vec![0xAB; MAX_CHUNK_LEN + 1]];
        let mut stream = Vec::new();
        for p in &payloads {
            stream.extend_from_slice(&encode_length_header(p.len()).unwrap());
            stream.extend_from_slice(p);
        }
        stream.extend_from_slice(&STREAM_TERMINATOR);

        let mut cursor = Cursor::new(stream);
        for p in &payloads {
            assert_eq!(read_video_frame(&mut cursor).unwrap().as_ref(), Some(p));
        }
        assert_eq!(read_video_frame(&mut cursor).unwrap(), None);
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            decode_length_header(&[0, 0]),
            Err(ProtocolError::IncompleteFrame {
                expected: 4,
                actual: 2
            })
        ));
    }
}
