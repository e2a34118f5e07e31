//! Device access used by [`Tether`](crate::Tether)
//!
//! [`DeviceOpener`] is everything the connect path needs from the bus. The
//! libusb implementation goes through [`enumerator`](super::enumerator);
//! tests substitute [`crate::testing::MockOpener`].

use crate::config::StreamSettings;
use crate::session::Session;
use crate::usb::context::LibraryContext;
use crate::usb::enumerator;
use crate::usb::transport::{Transport, UsbTransport};
use common::{DeviceDescription, DeviceIdentity, Result};
use std::sync::Arc;

pub trait DeviceOpener: Send + Sync {
    /// Attached Android phones
    fn list(&self, filters: &[String]) -> Result<Vec<DeviceDescription>>;

    /// Open the first attached candidate for control transfers only
    ///
    /// The device is closed when the returned transport is dropped.
    fn open_control(
        &self,
        candidates: &[DeviceIdentity],
    ) -> Result<(Arc<dyn Transport>, DeviceIdentity)>;

    /// Open the first attached candidate with its accessory interface claimed
    fn open_session(
        &self,
        candidates: &[DeviceIdentity],
        settings: StreamSettings,
    ) -> Result<Session>;
}

/// Opens real devices through the shared libusb context
pub struct LibusbOpener {
    context: Arc<LibraryContext>,
}

impl LibusbOpener {
    pub fn new(context: Arc<LibraryContext>) -> Self {
        Self { context }
    }
}

impl DeviceOpener for LibusbOpener {
    fn list(&self, filters: &[String]) -> Result<Vec<DeviceDescription>> {
        enumerator::list_android_devices(&self.context.usb()?, filters)
    }

    fn open_control(
        &self,
        candidates: &[DeviceIdentity],
    ) -> Result<(Arc<dyn Transport>, DeviceIdentity)> {
        let (handle, identity) = enumerator::open_device(&self.context.usb()?, candidates)?;
        let transport: Arc<dyn Transport> = Arc::new(UsbTransport::unclaimed(handle));
        Ok((transport, identity))
    }

    fn open_session(
        &self,
        candidates: &[DeviceIdentity],
        settings: StreamSettings,
    ) -> Result<Session> {
        enumerator::open_and_claim(
            &self.context.usb()?,
            candidates,
            self.context.compressor(),
            settings,
        )
    }
}
