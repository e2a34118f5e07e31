//! USB subsystem
//!
//! - [`context`]: process-wide libusb context and compressor
//! - [`enumerator`]: device listing and opening
//! - [`negotiator`]: switching a phone into accessory mode
//! - [`opener`]: the device access seam used by the tether
//! - [`transport`]: the blocking transfer seam every worker goes through
//!
//! All transfers are synchronous libusb calls made on the caller's thread or
//! on a session worker thread, never on the async runtime.

pub mod context;
pub mod enumerator;
pub mod negotiator;
pub mod opener;
pub mod transport;

pub use context::LibraryContext;
pub use enumerator::{list_android_devices, open_and_claim, open_device};
pub use negotiator::convert_to_accessory;
pub use opener::{DeviceOpener, LibusbOpener};
pub use transport::{Transport, UsbTransport};
