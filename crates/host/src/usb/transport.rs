//! Transfer seam between the protocol engine and libusb
//!
//! Everything above this module talks to a [`Transport`], so the negotiator,
//! the handshake and both stream workers run unchanged against the scripted
//! transport in [`crate::testing`].

use common::{Error, Result};
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Blocking USB transfers on one opened device
///
/// All methods take `&self`; the stream workers issue transfers concurrently
/// from their own threads.
pub trait Transport: Send + Sync {
    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;
}

/// An opened libusb device, optionally holding a claimed interface
///
/// The interface is released and the handle closed when this is dropped,
/// which happens only after every worker holding a reference has exited.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    claimed: Option<u8>,
}

impl UsbTransport {
    /// Wrap a handle used only for control transfers on endpoint 0
    pub fn unclaimed(handle: DeviceHandle<Context>) -> Self {
        Self {
            handle,
            claimed: None,
        }
    }

    /// Claim `interface`, detaching a kernel driver first where supported
    pub fn claim(mut handle: DeviceHandle<Context>, interface: u8) -> Result<Self> {
        match handle.kernel_driver_active(interface) {
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", interface);
                if let Err(e) = handle.detach_kernel_driver(interface) {
                    warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface, e
                    );
                }
            }
            Ok(false) => {}
            // Not supported on this platform
            Err(_) => {}
        }

        handle
            .claim_interface(interface)
            .map_err(|e| Error::InterfaceClaim {
                interface,
                message: e.to_string(),
            })?;

        debug!("Claimed interface {}", interface);
        Ok(Self {
            handle,
            claimed: Some(interface),
        })
    }
}

impl Transport for UsbTransport {
    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.read_bulk(endpoint, buf, timeout)
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.write_bulk(endpoint, buf, timeout)
    }

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        self.handle
            .read_control(request_type, request, value, index, buf, timeout)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        self.handle
            .write_control(request_type, request, value, index, buf, timeout)
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Some(interface) = self.claimed.take() {
            match self.handle.release_interface(interface) {
                Ok(()) => debug!("Released interface {}", interface),
                // The device is usually already gone after a link failure
                Err(e) => debug!("Failed to release interface {}: {}", interface, e),
            }
        }
    }
}

/// libusb status code for a rusb error
pub fn libusb_status(err: rusb::Error) -> i32 {
    match err {
        rusb::Error::Io => -1,
        rusb::Error::InvalidParam => -2,
        rusb::Error::Access => -3,
        rusb::Error::NoDevice => -4,
        rusb::Error::NotFound => -5,
        rusb::Error::Busy => -6,
        rusb::Error::Timeout => -7,
        rusb::Error::Overflow => -8,
        rusb::Error::Pipe => -9,
        rusb::Error::Interrupted => -10,
        rusb::Error::NoMem => -11,
        rusb::Error::NotSupported => -12,
        _ => -99,
    }
}

/// Streaming failure for a bulk transfer error
pub fn transport_error(err: rusb::Error) -> Error {
    Error::Transport {
        status: libusb_status(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_libusb_status() {
        assert_eq!(libusb_status(rusb::Error::Io), -1);
        assert_eq!(libusb_status(rusb::Error::NoDevice), -4);
        assert_eq!(libusb_status(rusb::Error::Timeout), -7);
        assert_eq!(libusb_status(rusb::Error::Pipe), -9);
        assert_eq!(libusb_status(rusb::Error::Other), -99);
    }

    #[test]
    fn test_transport_error_code() {
        // Unplugged cable
        assert_eq!(transport_error(rusb::Error::NoDevice).code(), -1004);
        assert_eq!(transport_error(rusb::Error::Pipe).code(), -1009);
    }
}
