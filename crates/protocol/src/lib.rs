//! Wire formats for hmd-tether
//!
//! This crate defines everything that crosses the USB cable between the host
//! and the phone acting as a head-mounted display. It performs no I/O of its
//! own beyond the blocking stream reader used by device emulators.
//!
//! - [`aoap`]: accessory negotiation control-transfer constants
//! - [`handshake`]: the tagged frame the phone sends once in accessory mode
//! - [`orientation`]: fixed-size quaternion telemetry (device -> host)
//! - [`video`]: length-prefixed JPEG frames (host -> device)
//! - [`endian`]: big-endian conversions shared by all of the above
//!
//! # Example
//!
//! ```
//! use protocol::{ViewerParams, encode_handshake, parse_handshake, HANDSHAKE_FRAME_LEN};
//!
//! let params = ViewerParams { width: 640, height: 480, interpupillary_distance: 0.064 };
//! let frame = encode_handshake(&params, HANDSHAKE_FRAME_LEN);
//! assert_eq!(parse_handshake(&frame, HANDSHAKE_FRAME_LEN).unwrap(), params);
//! ```

pub mod aoap;
pub mod endian;
pub mod error;
pub mod handshake;
pub mod orientation;
pub mod video;

pub use aoap::{AccessoryIdentity, StringIndex};
pub use error::{ProtocolError, Result};
pub use handshake::{HANDSHAKE_FRAME_LEN, ViewerParams, encode_handshake, parse_handshake};
pub use orientation::{
    ORIENTATION_FRAME_LEN, Orientation, WIRE_TO_PUBLISHED, decode_orientation, encode_orientation,
};
pub use video::{
    HEADER_LEN, MAX_CHUNK_LEN, MAX_VIDEO_FRAME_LEN, STREAM_TERMINATOR, encode_length_header,
    read_video_frame,
};
