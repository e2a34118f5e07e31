//! Event bridge from USB worker threads to the owner
//!
//! Workers run on dedicated OS threads and must never block on the consumer,
//! so the sending side never waits: when the queue is full the oldest event
//! is displaced, and the latest status always gets through. The receiving
//! side can be drained from async code (the CLI) or by blocking.

use crate::usb_types::DeviceDescription;
use async_channel::{Receiver, Sender, bounded};
use protocol::ViewerParams;
use std::fmt;
use tracing::warn;

/// Capacity of the event queue; events are rare (a handful per connection)
const EVENT_CAPACITY: usize = 64;

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit disconnect by the caller
    User,
    /// The viewer's handshake frame was malformed or could not be read;
    /// carries the error code
    HandshakeFailed { code: i32 },
    /// A streaming worker lost the link; carries the error code
    LinkFailed { code: i32 },
}

impl DisconnectReason {
    /// 0 for user-initiated, the failure code otherwise
    pub fn code(&self) -> i32 {
        match self {
            DisconnectReason::User => 0,
            DisconnectReason::HandshakeFailed { code } | DisconnectReason::LinkFailed { code } => {
                *code
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, DisconnectReason::User)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::User => write!(f, "disconnected by user"),
            DisconnectReason::HandshakeFailed { code } => {
                write!(f, "USB handshake failure ({})", code)
            }
            DisconnectReason::LinkFailed { code } => write!(
                f,
                "the USB connection failed ({}), most likely the cable was disconnected",
                code
            ),
        }
    }
}

/// Status notifications for the collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum TetherEvent {
    /// An accessory-mode device was opened; waiting for its handshake
    Connected { description: DeviceDescription },
    /// Handshake accepted, both streams running
    Streaming { viewer: ViewerParams },
    /// The session was torn down
    Disconnected { reason: DisconnectReason },
}

/// Sending half, cloned into worker closures
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<TetherEvent>,
}

impl EventSender {
    /// Queue an event without blocking; drops it if nobody is listening
    ///
    /// A full queue loses its oldest event instead of this one.
    pub fn send(&self, event: TetherEvent) {
        if let Ok(Some(displaced)) = self.tx.force_send(event) {
            warn!("Event queue full, dropping {:?}", displaced);
        }
    }
}

/// Receiving half, held by the owner
#[derive(Clone)]
pub struct EventReceiver {
    rx: Receiver<TetherEvent>,
}

impl EventReceiver {
    /// Wait for the next event (async)
    pub async fn recv(&self) -> crate::Result<TetherEvent> {
        self.rx.recv().await.map_err(|_| crate::Error::Closed)
    }

    /// Wait for the next event (blocking)
    pub fn recv_blocking(&self) -> crate::Result<TetherEvent> {
        self.rx.recv_blocking().map_err(|_| crate::Error::Closed)
    }

    /// Take an event if one is queued
    pub fn try_recv(&self) -> Option<TetherEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued
    pub fn drain(&self) -> Vec<TetherEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Create the event bridge
///
/// Returns (EventSender for workers, EventReceiver for the owner)
pub fn create_event_bridge() -> (EventSender, EventReceiver) {
    let (tx, rx) = bounded(EVENT_CAPACITY);
    (EventSender { tx }, EventReceiver { rx })
}
