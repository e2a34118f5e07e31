//! Receive worker (device -> host)

use super::SessionInner;
use crate::usb::transport::transport_error;
use crate::worker::CancelToken;
use common::Error;
use tracing::{debug, error, trace};

/// What the receive worker reports to its callback
#[derive(Debug)]
pub enum ReceiveEvent<'a> {
    /// One complete frame, valid only for the duration of the call
    Frame(&'a [u8]),
    /// The link failed; the worker has stopped. Reported at most once.
    Failed(Error),
}

/// Worker body: read `frame_size` byte frames until cancelled or the link
/// fails
pub(crate) fn run<F>(inner: &SessionInner, token: &CancelToken, frame_size: usize, mut callback: F)
where
    F: FnMut(ReceiveEvent<'_>),
{
    let mut buf = vec![0u8; frame_size];
    let mut frames = 0u64;

    while !token.is_cancelled() {
        match inner
            .transport
            .read_bulk(inner.endpoints.input, &mut buf, inner.settings.poll_timeout())
        {
            Ok(len) if len == frame_size => {
                frames += 1;
                callback(ReceiveEvent::Frame(&buf));
            }
            Ok(len) => {
                trace!("Ignoring short read ({} of {} bytes)", len, frame_size);
            }
            Err(rusb::Error::Timeout) | Err(rusb::Error::Interrupted) => {}
            // Transfers aborted by teardown are not failures
            Err(_) if token.is_cancelled() => break,
            Err(e) => {
                inner.clear_handshake();
                error!("Receive stream failed after {} frames: {}", frames, e);
                callback(ReceiveEvent::Failed(transport_error(e)));
                return;
            }
        }
    }

    debug!("Receive worker stopped after {} frames", frames);
}
