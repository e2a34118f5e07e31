//! Send worker (host -> device)
//!
//! The producer drops frames into a single-slot staging buffer; the worker
//! compresses whatever is there and writes it as one length-prefixed video
//! frame. The worker holds the slot lock while compressing and sending, so a
//! producer that finds the lock taken simply drops its frame.

use super::{SessionInner, lock};
use crate::compress::{BYTES_PER_PIXEL, FrameView};
use crate::config::StreamSettings;
use crate::usb::transport::transport_error;
use crate::worker::CancelToken;
use common::{Error, Result};
use protocol::video::chunks;
use protocol::{MAX_VIDEO_FRAME_LEN, STREAM_TERMINATOR, encode_length_header};
use std::sync::{Condvar, Mutex, PoisonError, TryLockError};
use tracing::{debug, error, trace, warn};

/// Result of [`Session::submit_frame`](super::Session::submit_frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Copied into the staging buffer; replaces any frame not yet sent
    Queued,
    /// The worker is busy with the previous frame; this one was dropped
    Busy,
    /// No send worker is running
    NotStreaming,
}

/// Staging buffer for the next frame
#[derive(Default)]
pub(crate) struct PendingFrame {
    /// Grow-only; only the first `row_pitch * height` bytes are meaningful
    pixels: Vec<u8>,
    width: u32,
    row_pitch: u32,
    height: u32,
    ready: bool,
}

impl PendingFrame {
    fn view(&self) -> FrameView<'_> {
        let len = self.row_pitch as usize * self.height as usize;
        FrameView {
            pixels: &self.pixels[..len],
            width: self.width,
            row_pitch: self.row_pitch,
            height: self.height,
        }
    }
}

#[derive(Default)]
pub(crate) struct FrameSlot {
    pending: Mutex<PendingFrame>,
    ready: Condvar,
}

impl FrameSlot {
    /// Copy a frame in and signal the worker, unless it is mid-transfer
    pub(crate) fn submit(
        &self,
        pixels: &[u8],
        width: u32,
        row_pitch: u32,
        height: u32,
    ) -> SubmitStatus {
        let mut pending = match self.pending.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return SubmitStatus::Busy,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };

        let len = row_pitch as usize * height as usize;
        if pending.pixels.len() < len {
            pending.pixels.resize(len, 0);
        }
        pending.pixels[..len].copy_from_slice(&pixels[..len]);
        pending.width = width;
        pending.row_pitch = row_pitch;
        pending.height = height;
        if pending.ready {
            trace!("Replacing unsent frame");
        }
        pending.ready = true;
        drop(pending);

        self.ready.notify_one();
        SubmitStatus::Queued
    }

    /// Wake the worker so it notices cancellation
    pub(crate) fn wake(&self) {
        self.ready.notify_all();
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        lock(&self.pending).pixels.len()
    }
}

/// Reject frames the worker could not read safely
pub(crate) fn validate_frame(
    pixels: &[u8],
    width: u32,
    row_pitch: u32,
    height: u32,
    settings: &StreamSettings,
) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidFrame(format!(
            "empty frame ({}x{})",
            width, height
        )));
    }

    let row_len = width as usize * BYTES_PER_PIXEL;
    if (row_pitch as usize) < row_len {
        return Err(Error::InvalidFrame(format!(
            "row pitch {} is less than {} bytes for width {}",
            row_pitch, row_len, width
        )));
    }

    let len = row_pitch as usize * height as usize;
    if len > settings.max_image_bytes {
        return Err(Error::InvalidFrame(format!(
            "{} byte image exceeds the maximum of {}",
            len, settings.max_image_bytes
        )));
    }
    if pixels.len() < len {
        return Err(Error::InvalidFrame(format!(
            "pixel buffer holds {} bytes, need {}",
            pixels.len(),
            len
        )));
    }

    Ok(())
}

/// Worker body: wait for a frame, compress, send, repeat
pub(crate) fn run<F>(inner: &SessionInner, token: &CancelToken, on_failure: F)
where
    F: FnOnce(Error),
{
    let slot = &inner.frame_slot;
    let poll = inner.settings.poll_timeout();
    let mut jpeg = Vec::new();
    let mut sent = 0u64;

    let mut pending = lock(&slot.pending);
    loop {
        while !pending.ready && !token.is_cancelled() {
            // Bounded wait so a lost wakeup cannot park the worker forever
            let (guard, _) = slot
                .ready
                .wait_timeout(pending, poll)
                .unwrap_or_else(PoisonError::into_inner);
            pending = guard;
        }

        if token.is_cancelled() {
            drop(pending);
            // Best effort; the device may already be gone
            let _ = inner
                .transport
                .write_bulk(inner.endpoints.output, &STREAM_TERMINATOR, poll);
            debug!("Send worker stopped after {} frames", sent);
            return;
        }

        let result = transmit(inner, &pending, &mut jpeg);
        pending.ready = false;

        match result {
            Ok(()) => sent += 1,
            // Transfers aborted by teardown are not failures. The frame may
            // be partial, so no terminator follows it.
            Err(err) if token.is_cancelled() => {
                debug!("Send worker stopped mid-frame after {} frames: {}", sent, err);
                return;
            }
            Err(err) => {
                drop(pending);
                inner.clear_handshake();
                error!("Send stream failed after {} frames: {}", sent, err);
                on_failure(err);
                return;
            }
        }
    }
}

/// Compress the pending frame and write it as one video frame
///
/// Not interruptible: once the header is out the whole payload follows, so
/// the phone never sees a length header without its bytes.
fn transmit(
    inner: &SessionInner,
    frame: &PendingFrame,
    jpeg: &mut Vec<u8>,
) -> Result<()> {
    inner.compressor.compress(&frame.view(), jpeg)?;

    if jpeg.len() > MAX_VIDEO_FRAME_LEN {
        return Err(Error::Compression(format!(
            "compressed frame of {} bytes exceeds the {} byte limit",
            jpeg.len(),
            MAX_VIDEO_FRAME_LEN
        )));
    }
    let header = encode_length_header(jpeg.len()).map_err(|e| Error::Compression(e.to_string()))?;

    write_all(inner, &header)?;
    for chunk in chunks(jpeg, inner.settings.chunk_size) {
        write_all(inner, chunk)?;
    }

    trace!("Sent {} byte frame", jpeg.len());
    Ok(())
}

/// One bulk write that must be accepted in full
fn write_all(inner: &SessionInner, data: &[u8]) -> Result<()> {
    match inner.transport.write_bulk(
        inner.endpoints.output,
        data,
        inner.settings.poll_timeout(),
    ) {
        Ok(len) if len == data.len() => Ok(()),
        Ok(len) => {
            warn!("Short bulk write: {} of {} bytes", len, data.len());
            Err(transport_error(rusb::Error::Io))
        }
        Err(e) => Err(transport_error(e)),
    }
}
