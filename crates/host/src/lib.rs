//! hmd-tether host library
//!
//! Drives an Android phone as a tethered head-mounted display over USB:
//! switches it into accessory mode, waits for the viewer handshake, then
//! streams JPEG frames to it while reading back head orientation.
//!
//! Most callers only need [`Tether`]; [`Session`] and the [`usb`] module are
//! public for tools and tests that drive a device directly.

pub mod compress;
pub mod config;
pub mod session;
pub mod testing;
pub mod tether;
pub mod usb;
pub mod worker;

pub use compress::{ChromaSubsampling, FrameCompressor, FrameView, JpegCompressor};
pub use config::{HostConfig, StreamSettings, load_config};
pub use session::{Endpoints, HandshakeState, ReceiveEvent, Session, SessionLink, SubmitStatus};
pub use tether::Tether;
pub use usb::{DeviceOpener, LibraryContext, LibusbOpener};
