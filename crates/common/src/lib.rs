//! Common utilities for hmd-tether
//!
//! Shared between the host library and its CLI: device identities and
//! filters, the error type with its stable codes, logging setup, and the
//! event bridge from USB worker threads to async code.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod usb_types;

pub use channel::{DisconnectReason, EventReceiver, EventSender, TetherEvent, create_event_bridge};
pub use error::{Error, HANDSHAKE_PROTOCOL_CODE, Result};
pub use logging::setup_logging;
pub use usb_types::{DeviceDescription, DeviceIdentity, matches_filter};
