//! Post-negotiation handshake frame
//!
//! After the phone opens the accessory it writes a single tagged frame on the
//! bulk IN endpoint describing the viewer:
//!
//! ```text
//! [0]      0x27  header tag
//! [1]      0x28  width tag     [2..6]   i32 width  (big-endian)
//! [6]      0x29  height tag    [7..11]  i32 height (big-endian)
//! [11]     0x2A  IPD tag       [12..16] f32 interpupillary distance, metres
//! [16..]   0x30  fill (every remaining byte)
//! ```
//!
//! The layout is a fixed contract, not a general TLV format: tags must appear
//! at exactly these offsets.

use crate::endian;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

pub const TAG_HEADER: u8 = 0x27;
pub const TAG_WIDTH: u8 = 0x28;
pub const TAG_HEIGHT: u8 = 0x29;
pub const TAG_INTERPUPILLARY: u8 = 0x2A;
pub const TAG_FILL: u8 = 0x30;

/// Length of the reference handshake frame; also the minimum accepted length
pub const HANDSHAKE_FRAME_LEN: usize = 16;

const WIDTH_OFFSET: usize = 1;
const HEIGHT_OFFSET: usize = 6;
const INTERPUPILLARY_OFFSET: usize = 11;

/// Display geometry reported by the viewer during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerParams {
    pub width: i32,
    pub height: i32,
    pub interpupillary_distance: f32,
}

/// Validate a handshake frame of exactly `frame_len` bytes and extract the
/// viewer parameters
///
/// `frame_len` must be at least [`HANDSHAKE_FRAME_LEN`]; bytes past the IPD
/// field must all equal [`TAG_FILL`].
pub fn parse_handshake(buf: &[u8], frame_len: usize) -> Result<ViewerParams> {
    let frame_len = frame_len.max(HANDSHAKE_FRAME_LEN);
    if buf.len() != frame_len {
        return Err(ProtocolError::IncompleteFrame {
            expected: frame_len,
            actual: buf.len(),
        });
    }

    expect_tag(buf, 0, TAG_HEADER)?;

    expect_tag(buf, WIDTH_OFFSET, TAG_WIDTH)?;
    let width = endian::read_i32(&buf[WIDTH_OFFSET + 1..]);

    expect_tag(buf, HEIGHT_OFFSET, TAG_HEIGHT)?;
    let height = endian::read_i32(&buf[HEIGHT_OFFSET + 1..]);

    expect_tag(buf, INTERPUPILLARY_OFFSET, TAG_INTERPUPILLARY)?;
    let interpupillary_distance = endian::read_f32(&buf[INTERPUPILLARY_OFFSET + 1..]);

    for offset in HANDSHAKE_FRAME_LEN..frame_len {
        expect_tag(buf, offset, TAG_FILL)?;
    }

    Ok(ViewerParams {
        width,
        height,
        interpupillary_distance,
    })
}

/// Build the frame a viewer would send for `params`
///
/// Used by device emulators and tests.
pub fn encode_handshake(params: &ViewerParams, frame_len: usize) -> Vec<u8> {
    let mut frame = vec![TAG_FILL; frame_len.max(HANDSHAKE_FRAME_LEN)];

    frame[0] = TAG_HEADER;
    frame[WIDTH_OFFSET] = TAG_WIDTH;
    endian::write_i32(&mut frame[WIDTH_OFFSET + 1..], params.width);
    frame[HEIGHT_OFFSET] = TAG_HEIGHT;
    endian::write_i32(&mut frame[HEIGHT_OFFSET + 1..], params.height);
    frame[INTERPUPILLARY_OFFSET] = TAG_INTERPUPILLARY;
    endian::write_f32(
        &mut frame[INTERPUPILLARY_OFFSET + 1..],
        params.interpupillary_distance,
    );

    frame
}

/// Offsets of every tag byte in a frame of `frame_len` bytes
pub fn tag_offsets(frame_len: usize) -> impl Iterator<Item = usize> {
    [0, WIDTH_OFFSET, HEIGHT_OFFSET, INTERPUPILLARY_OFFSET]
        .into_iter()
        .chain(HANDSHAKE_FRAME_LEN..frame_len.max(HANDSHAKE_FRAME_LEN))
}

fn expect_tag(buf: &[u8], offset: usize, expected: u8) -> Result<()> {
    let actual = buf[offset];
    if actual != expected {
        return Err(ProtocolError::TagMismatch {
            offset,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_frame() {
        let buf = [
            0x27, 0x28, 0, 0, 2, 0x80, 0x29, 0, 0, 1, 0xE0, 0x2A, 0, 0, 0, 0,
        ];
        let params = parse_handshake(&buf, HANDSHAKE_FRAME_LEN).unwrap();
        assert_eq!(params.width, 640);
        assert_eq!(params.height, 480);
        assert_eq!(params.interpupillary_distance, 0.0);
    }

    #[test]
    fn test_reference_frame_with_fill() {
        let mut buf = vec![
            0x27, 0x28, 0, 0, 2, 0x80, 0x29, 0, 0, 1, 0xE0, 0x2A, 0, 0, 0, 0,
        ];
        buf.extend(std::iter::repeat_n(TAG_FILL, 16));
        let params = parse_handshake(&buf, 32).unwrap();
        assert_eq!((params.width, params.height), (640, 480));
    }

    #[test]
    fn test_bad_fill_rejected() {
        let mut buf = encode_handshake(
            &ViewerParams {
                width: 1,
                height: 1,
                interpupillary_distance: 0.06,
            },
            20,
        );
        buf[19] = 0x31;
        match parse_handshake(&buf, 20) {
            Err(ProtocolError::TagMismatch { offset, .. }) => assert_eq!(offset, 19),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_short_frame_rejected() {
        let buf = [TAG_HEADER; 10];
        assert!(matches!(
            parse_handshake(&buf, HANDSHAKE_FRAME_LEN),
            Err(ProtocolError::IncompleteFrame {
                expected: 16,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_tag_offsets() {
        let offsets: Vec<usize> = tag_offsets(18).collect();
        assert_eq!(offsets, vec![0, 1, 6, 11, 16, 17]);
    }
}
