//! Collaborator-facing API
//!
//! [`Tether`] owns at most one [`Session`] and drives it through
//! `connect -> negotiate -> handshake -> stream`. The renderer submits frames
//! and reads the latest orientation; everything else is reported as
//! [`TetherEvent`]s.

use crate::config::HostConfig;
use crate::session::{ReceiveEvent, Session, SessionLink, SubmitStatus, lock};
use crate::usb::{DeviceOpener, LibraryContext, LibusbOpener, negotiator};
use common::usb_types::AOAP_IDS;
use common::{
    DeviceDescription, DeviceIdentity, DisconnectReason, Error, EventReceiver, EventSender,
    HANDSHAKE_PROTOCOL_CODE, Result, TetherEvent, create_event_bridge,
};
use protocol::{Orientation, ViewerParams, decode_orientation};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use tracing::{debug, info, trace, warn};

struct TetherShared {
    opener: Arc<dyn DeviceOpener>,
    config: HostConfig,
    active: Mutex<Option<Session>>,
    orientation: Mutex<Orientation>,
    events: EventSender,
    receiver: EventReceiver,
}

/// Connection manager for one tethered viewer
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Tether {
    shared: Arc<TetherShared>,
}

impl Tether {
    pub fn new(context: Arc<LibraryContext>, config: HostConfig) -> Self {
        Self::with_opener(Arc::new(LibusbOpener::new(context)), config)
    }

    /// A tether that reaches devices through `opener`
    pub fn with_opener(opener: Arc<dyn DeviceOpener>, config: HostConfig) -> Self {
        let (events, receiver) = create_event_bridge();
        Self {
            shared: Arc::new(TetherShared {
                opener,
                config,
                active: Mutex::new(None),
                orientation: Mutex::new(Orientation::IDENTITY),
                events,
                receiver,
            }),
        }
    }

    /// Status notifications; every clone receives from the same queue
    ///
    /// The queue is bounded and stays open while the tether lives. A caller
    /// that stops draining it loses the oldest events first, so the most
    /// recent `Disconnected` is always delivered.
    pub fn events(&self) -> EventReceiver {
        self.shared.receiver.clone()
    }

    /// Attached Android phones, including ones already in accessory mode
    pub fn list_devices(&self) -> Result<Vec<DeviceDescription>> {
        self.shared.opener.list(&self.shared.config.usb.filters)
    }

    /// Connect to `identity`, negotiating accessory mode first if needed
    ///
    /// Blocks for device discovery and the re-enumeration delay. The
    /// handshake continues in the background; watch [`Tether::events`].
    pub fn connect(&self, identity: DeviceIdentity) -> Result<()> {
        self.ensure_disconnected()?;

        let session = if identity.is_accessory() {
            self.open_accessory(&[identity])?
        } else {
            self.negotiate_and_open(&[identity])?
        };
        self.attach_session(session)
    }

    /// Connect to whichever phone is present
    ///
    /// A phone already in accessory mode is used directly; otherwise the
    /// configured candidates are negotiated in order.
    pub fn connect_any(&self) -> Result<()> {
        self.ensure_disconnected()?;

        let session = match self.open_accessory(&AOAP_IDS) {
            Ok(session) => session,
            Err(Error::NotFound) => {
                let candidates = self
                    .shared
                    .config
                    .usb
                    .candidate_identities()
                    .map_err(|e| Error::Config(e.to_string()))?;
                self.negotiate_and_open(&candidates)?
            }
            Err(e) => return Err(e),
        };
        self.attach_session(session)
    }

    /// Start the handshake on an already opened session and take ownership
    /// of it
    pub fn attach_session(&self, session: Session) -> Result<()> {
        let mut active = lock(&self.shared.active);
        if active.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let description = session.description().clone();
        let link = session.link();
        let weak = Arc::downgrade(&self.shared);
        session.wait_handshake_async(move |ok| on_handshake(&weak, &link, ok))?;

        *active = Some(session);
        // Sent under the lock so it precedes any event the handshake raises
        self.shared.events.send(TetherEvent::Connected {
            description: description.clone(),
        });
        drop(active);

        info!("Connected to {}, waiting for handshake", description);
        Ok(())
    }

    /// Tear down the session and report `reason`; no-op when disconnected
    pub fn disconnect(&self, reason: DisconnectReason) {
        self.shared.disconnect(reason);
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared.active).is_some()
    }

    /// Connected, handshake done and the send worker alive
    pub fn is_streaming(&self) -> bool {
        lock(&self.shared.active)
            .as_ref()
            .is_some_and(|s| s.is_handshake_complete() && s.is_sending())
    }

    /// Hand a captured BGRX image to the send worker without blocking
    pub fn submit_frame(
        &self,
        pixels: &[u8],
        width: u32,
        row_pitch: u32,
        height: u32,
    ) -> Result<SubmitStatus> {
        match lock(&self.shared.active).as_ref() {
            Some(session) => session.submit_frame(pixels, width, row_pitch, height),
            None => Ok(SubmitStatus::NotStreaming),
        }
    }

    /// Latest head orientation; identity until the first frame arrives
    pub fn orientation(&self) -> Orientation {
        *lock(&self.shared.orientation)
    }

    pub fn viewer_params(&self) -> Option<ViewerParams> {
        lock(&self.shared.active)
            .as_ref()
            .and_then(Session::viewer_params)
    }

    /// Description of the connected device
    pub fn device(&self) -> Option<DeviceDescription> {
        lock(&self.shared.active)
            .as_ref()
            .map(|s| s.description().clone())
    }

    fn ensure_disconnected(&self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        Ok(())
    }

    fn open_accessory(&self, candidates: &[DeviceIdentity]) -> Result<Session> {
        self.shared
            .opener
            .open_session(candidates, self.shared.config.stream.clone())
    }

    /// Negotiate the first attached plain candidate, then open the
    /// re-enumerated accessory
    ///
    /// A candidate that is not attached is not an error by itself: the phone
    /// may already have switched, so the accessory IDs are tried regardless.
    fn negotiate_and_open(&self, candidates: &[DeviceIdentity]) -> Result<Session> {
        let plain: Vec<DeviceIdentity> = candidates
            .iter()
            .filter(|id| !id.is_accessory())
            .copied()
            .collect();

        match self.shared.opener.open_control(&plain) {
            Ok((transport, identity)) => {
                info!("Switching {} to accessory mode", identity);
                negotiator::convert_to_accessory(&*transport, &self.shared.config.accessory)?;
                drop(transport);

                let delay = self.shared.config.usb.settle_delay();
                debug!("Waiting {:?} for re-enumeration", delay);
                thread::sleep(delay);
            }
            Err(Error::NotFound) => {
                debug!("No plain candidate attached, looking for an accessory");
            }
            Err(e) => return Err(e),
        }

        self.open_accessory(&AOAP_IDS)
    }
}

impl TetherShared {
    fn disconnect(&self, reason: DisconnectReason) {
        let Some(session) = lock(&self.active).take() else {
            debug!("Disconnect ({}) ignored, not connected", reason);
            return;
        };

        session.close();
        drop(session);
        *lock(&self.orientation) = Orientation::IDENTITY;

        if reason.is_failure() {
            warn!("Disconnected: {}", reason);
        } else {
            info!("Disconnected: {}", reason);
        }
        self.events.send(TetherEvent::Disconnected { reason });
    }
}

/// Handshake completion: start both streams or tear down
fn on_handshake(weak: &Weak<TetherShared>, link: &SessionLink, ok: bool) {
    let Some(shared) = weak.upgrade() else {
        return;
    };

    if !ok {
        let code = link.handshake_error().unwrap_or(HANDSHAKE_PROTOCOL_CODE);
        shared.disconnect(DisconnectReason::HandshakeFailed { code });
        return;
    }

    let active = lock(&shared.active);
    if active.is_none() {
        // Disconnected while the handshake was finishing
        return;
    }
    let started = start_streams(weak, link, shared.config.stream.orientation_frame_len);
    if let (Ok(()), Some(viewer)) = (&started, link.viewer_params()) {
        info!(
            "Streaming to {}x{} viewer (IPD {:.3} m)",
            viewer.width, viewer.height, viewer.interpupillary_distance
        );
        shared.events.send(TetherEvent::Streaming { viewer });
    }
    drop(active);

    if let Err(err) = started {
        warn!("Failed to start streams: {}", err);
        shared.disconnect(DisconnectReason::LinkFailed { code: err.code() });
    }
}

fn start_streams(weak: &Weak<TetherShared>, link: &SessionLink, frame_len: usize) -> Result<()> {
    let receive_owner = weak.clone();
    link.begin_read_loop(frame_len, move |event| {
        let Some(shared) = receive_owner.upgrade() else {
            return;
        };
        match event {
            ReceiveEvent::Frame(frame) => match decode_orientation(frame) {
                Ok(orientation) => *lock(&shared.orientation) = orientation,
                Err(e) => trace!("Undecodable orientation frame: {}", e),
            },
            ReceiveEvent::Failed(err) => {
                shared.disconnect(DisconnectReason::LinkFailed { code: err.code() });
            }
        }
    })?;

    let send_owner = weak.clone();
    link.begin_send_loop(move |err| {
        if let Some(shared) = send_owner.upgrade() {
            shared.disconnect(DisconnectReason::LinkFailed { code: err.code() });
        }
    })
}
