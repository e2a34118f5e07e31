//! Process-wide library state
//!
//! The libusb context and the frame compressor are shared by every session.
//! [`LibraryContext::shared`] hands out the live instance; the last owner to
//! drop its `Arc` releases both.

use crate::compress::{FrameCompressor, JpegCompressor};
use crate::config::JpegSettings;
use crate::usb::transport::libusb_status;
use common::{Error, Result};
use rusb::Context;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info};

static SHARED: Mutex<Weak<LibraryContext>> = Mutex::new(Weak::new());

pub struct LibraryContext {
    usb: Mutex<Option<Context>>,
    compressor: Arc<dyn FrameCompressor>,
}

impl LibraryContext {
    /// Create a context with its own compressor
    ///
    /// libusb is initialized lazily on first use, so a context built for
    /// tests never touches the host's USB stack.
    pub fn new(compressor: Arc<dyn FrameCompressor>) -> Self {
        Self {
            usb: Mutex::new(None),
            compressor,
        }
    }

    /// The process-wide context, created on first call
    ///
    /// `jpeg` only applies when no context is alive yet.
    pub fn shared(jpeg: &JpegSettings) -> Arc<Self> {
        let mut shared = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = shared.upgrade() {
            return ctx;
        }

        let ctx = Arc::new(Self::new(Arc::new(JpegCompressor::new(jpeg))));
        *shared = Arc::downgrade(&ctx);
        debug!("Created shared library context");
        ctx
    }

    /// The libusb context, initializing libusb if needed
    pub fn usb(&self) -> Result<Context> {
        let mut usb = self.usb.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = usb.as_ref() {
            return Ok(ctx.clone());
        }

        let ctx = Context::new().map_err(|e| Error::Transport {
            status: libusb_status(e),
        })?;
        let version = rusb::version();
        info!(
            "Initialized libusb {}.{}.{}",
            version.major(),
            version.minor(),
            version.micro()
        );
        *usb = Some(ctx.clone());
        Ok(ctx)
    }

    pub fn compressor(&self) -> Arc<dyn FrameCompressor> {
        Arc::clone(&self.compressor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_is_lazy() {
        let ctx = LibraryContext::new(Arc::new(JpegCompressor::default()));
        assert!(ctx.usb.lock().unwrap().is_none());
    }

    #[test]
    fn test_shared_is_reused_while_alive() {
        let settings = JpegSettings::default();
        let a = LibraryContext::shared(&settings);
        let b = LibraryContext::shared(&settings);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a.compressor(), &b.compressor()));
    }
}
