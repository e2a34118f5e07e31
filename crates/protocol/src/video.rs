//! Video stream framing (host -> device)
//!
//! Each compressed image is sent as a length-prefixed frame:
//!
//! ```text
//! [Length: u32 (big-endian)][JPEG bytes]
//! ```
//!
//! The payload is written in bulk transfers of at most [`MAX_CHUNK_LEN`]
//! bytes. A zero length header ([`STREAM_TERMINATOR`]) ends the stream
//! gracefully.

use crate::endian;
use crate::error::{ProtocolError, Result};
use std::io::Read;

/// Bytes in the length header
pub const HEADER_LEN: usize = 4;

/// Default bulk chunk size for payload writes (16 KiB)
pub const MAX_CHUNK_LEN: usize = 16 * 1024;

/// Largest frame the phone-side receiver accepts (4 MiB)
pub const MAX_VIDEO_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Header announcing the end of the stream
pub const STREAM_TERMINATOR: [u8; HEADER_LEN] = [0; HEADER_LEN];

/// Build the length header for a payload of `len` bytes
///
/// Fails when `len` is zero (reserved for the terminator) or exceeds
/// [`MAX_VIDEO_FRAME_LEN`].
pub fn encode_length_header(len: usize) -> Result<[u8; HEADER_LEN]> {
    if len == 0 {
        return Err(ProtocolError::IncompleteFrame {
            expected: 1,
            actual: 0,
        });
    }
    if len > MAX_VIDEO_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_VIDEO_FRAME_LEN,
        });
    }

    let mut header = [0u8; HEADER_LEN];
    endian::write_u32(&mut header, len as u32);
    Ok(header)
}

/// Parse a length header; `Ok(None)` is the stream terminator
pub fn decode_length_header(header: &[u8]) -> Result<Option<usize>> {
    if header.len() < HEADER_LEN {
        return Err(ProtocolError::IncompleteFrame {
            expected: HEADER_LEN,
            actual: header.len(),
        });
    }

    let len = endian::read_u32(header) as usize;
    if len == 0 {
        return Ok(None);
    }
    if len > MAX_VIDEO_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_VIDEO_FRAME_LEN,
        });
    }
    Ok(Some(len))
}

/// Split a payload into bulk-transfer sized chunks
///
/// `chunk_len` of zero is treated as [`MAX_CHUNK_LEN`].
pub fn chunks(payload: &[u8], chunk_len: usize) -> std::slice::Chunks<'_, u8> {
    let chunk_len = if chunk_len == 0 {
        MAX_CHUNK_LEN
    } else {
        chunk_len
    };
    payload.chunks(chunk_len)
}

/// Read one frame from a byte stream, as the phone does
///
/// Returns `Ok(None)` when the terminator header is read.
///
/// # Example
/// ```
/// use protocol::video::{encode_length_header, read_video_frame, STREAM_TERMINATOR};
/// use std::io::Cursor;
///
/// let mut stream = encode_length_header(3).unwrap().to_vec();
/// stream.extend_from_slice(&[0xFF, 0xD8, 0xFF]);
/// stream.extend_from_slice(&STREAM_TERMINATOR);
///
/// let mut cursor = Cursor::new(stream);
/// assert_eq!(read_video_frame(&mut cursor).unwrap(), Some(vec![0xFF, 0xD8, 0xFF]));
/// assert_eq!(read_video_frame(&mut cursor).unwrap(), None);
/// ```
pub fn read_video_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;

    let Some(len) = decode_length_header(&header)? else {
        return Ok(None);
    };

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}
