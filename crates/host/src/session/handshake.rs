//! Handshake worker
//!
//! Once the phone has opened the accessory it sends one tagged frame with
//! the viewer geometry. Until that frame has been validated neither stream
//! may start.

use super::SessionInner;
use crate::usb::transport::transport_error;
use crate::worker::CancelToken;
use common::Error;
use protocol::{ViewerParams, parse_handshake};
use tracing::{debug, info, warn};

/// Progress of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeState {
    Idle = 0,
    AwaitingFrame = 1,
    Validating = 2,
    Complete = 3,
    Failed = 4,
}

impl HandshakeState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => HandshakeState::AwaitingFrame,
            2 => HandshakeState::Validating,
            3 => HandshakeState::Complete,
            4 => HandshakeState::Failed,
            _ => HandshakeState::Idle,
        }
    }
}

enum Outcome {
    Complete(ViewerParams),
    Failed(Error),
    Cancelled,
}

/// Worker body: flush, wait for the frame, validate, report
pub(crate) fn run<F>(inner: &SessionInner, token: &CancelToken, callback: F)
where
    F: FnOnce(bool),
{
    inner.set_state(HandshakeState::AwaitingFrame);

    match wait_for_frame(inner, token) {
        Outcome::Complete(params) => {
            inner.complete_handshake(params);
            info!(
                "Handshake complete: {}x{}, IPD {} m",
                params.width, params.height, params.interpupillary_distance
            );
            callback(true);
        }
        Outcome::Failed(err) => {
            inner.fail_handshake(&err);
            warn!("Handshake failed: {}", err);
            callback(false);
        }
        Outcome::Cancelled => {
            debug!("Handshake cancelled");
        }
    }
}

fn wait_for_frame(inner: &SessionInner, token: &CancelToken) -> Outcome {
    let frame_len = inner.settings.handshake_frame_len;
    let mut buf = vec![0u8; frame_len];

    flush_stale_input(inner, token, &mut buf);

    loop {
        if token.is_cancelled() {
            return Outcome::Cancelled;
        }

        match inner
            .transport
            .read_bulk(inner.endpoints.input, &mut buf, inner.settings.poll_timeout())
        {
            Ok(len) => {
                inner.set_state(HandshakeState::Validating);
                return match parse_handshake(&buf[..len], frame_len) {
                    Ok(params) => Outcome::Complete(params),
                    Err(e) => Outcome::Failed(e.into()),
                };
            }
            Err(rusb::Error::Timeout) | Err(rusb::Error::Interrupted) => continue,
            Err(_) if token.is_cancelled() => return Outcome::Cancelled,
            Err(e) => return Outcome::Failed(transport_error(e)),
        }
    }
}

/// Discard whatever the phone queued before this session started reading
fn flush_stale_input(inner: &SessionInner, token: &CancelToken, buf: &mut [u8]) {
    let mut discarded = 0usize;
    while !token.is_cancelled() {
        match inner
            .transport
            .read_bulk(inner.endpoints.input, buf, inner.settings.flush_timeout())
        {
            Ok(len) => discarded += len,
            Err(_) => break,
        }
    }
    if discarded > 0 {
        debug!("Discarded {} stale bytes before handshake", discarded);
    }
}
