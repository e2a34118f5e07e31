//! Orientation telemetry frames (device -> host)
//!
//! Each frame carries four big-endian `f32` quaternion components. The phone
//! and host disagree on axis conventions; [`WIRE_TO_PUBLISHED`] holds the
//! empirically determined permutation and must be kept as-is.

use crate::endian;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Bytes in one orientation frame
pub const ORIENTATION_FRAME_LEN: usize = 4 * std::mem::size_of::<f32>();

/// Published component `i` is taken from wire component `WIRE_TO_PUBLISHED[i]`
///
/// Wire order is `[x, y, z, w]`; the published quaternion is
/// `[x, z, w, y]` of the wire values.
pub const WIRE_TO_PUBLISHED: [usize; 4] = [0, 2, 3, 1];

/// Head orientation quaternion as consumed by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Orientation {
    pub const IDENTITY: Orientation = Orientation {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    fn from_components(c: [f32; 4]) -> Self {
        Self {
            x: c[0],
            y: c[1],
            z: c[2],
            w: c[3],
        }
    }

    fn components(&self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Decode a frame into the raw wire components, in wire order
pub fn decode_wire_components(buf: &[u8]) -> Result<[f32; 4]> {
    if buf.len() < ORIENTATION_FRAME_LEN {
        return Err(ProtocolError::IncompleteFrame {
            expected: ORIENTATION_FRAME_LEN,
            actual: buf.len(),
        });
    }

    let mut wire = [0f32; 4];
    for (i, slot) in wire.iter_mut().enumerate() {
        *slot = endian::read_f32(&buf[i * 4..]);
    }
    Ok(wire)
}

/// Decode a frame and apply the axis remap
pub fn decode_orientation(buf: &[u8]) -> Result<Orientation> {
    let wire = decode_wire_components(buf)?;
    let mut published = [0f32; 4];
    for (i, slot) in published.iter_mut().enumerate() {
        *slot = wire[WIRE_TO_PUBLISHED[i]];
    }
    Ok(Orientation::from_components(published))
}

/// Encode a published orientation back into the wire frame that produces it
pub fn encode_orientation(orientation: &Orientation) -> [u8; ORIENTATION_FRAME_LEN] {
    let published = orientation.components();
    let mut wire = [0f32; 4];
    for (i, value) in published.iter().enumerate() {
        wire[WIRE_TO_PUBLISHED[i]] = *value;
    }

    let mut frame = [0u8; ORIENTATION_FRAME_LEN];
    for (i, value) in wire.iter().enumerate() {
        endian::write_f32(&mut frame[i * 4..], *value);
    }
    frame
}
