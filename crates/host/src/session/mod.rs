//! Device session
//!
//! A [`Session`] is one opened accessory-mode device with its bulk endpoint
//! pair. It runs up to three workers, each on its own thread:
//!
//! - handshake: waits for the viewer's tagged frame ([`handshake`])
//! - receive: reads fixed-size telemetry frames ([`receive`])
//! - send: compresses and writes submitted images ([`send`])
//!
//! Workers share the session state through an `Arc`, so the transport (and
//! with it the claimed interface and device handle) is only released after
//! the last worker has exited.

pub mod handshake;
pub mod receive;
pub mod send;

use crate::compress::FrameCompressor;
use crate::config::StreamSettings;
use crate::usb::Transport;
use crate::worker::Worker;
use common::{DeviceDescription, DeviceIdentity, Error, Result};
use protocol::ViewerParams;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

pub use handshake::HandshakeState;
pub use receive::ReceiveEvent;
pub use send::SubmitStatus;

/// Bulk endpoint addresses of the accessory interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    /// Bulk IN (device -> host)
    pub input: u8,
    /// Bulk OUT (host -> device)
    pub output: u8,
}

/// Lock a mutex whose data stays valid even if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct WorkerSlots {
    closing: bool,
    handshake: Option<Worker>,
    receive: Option<Worker>,
    send: Option<Worker>,
}

impl WorkerSlots {
    fn take_all(&mut self) -> Vec<Worker> {
        [self.handshake.take(), self.receive.take(), self.send.take()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// State shared between the session owner and its workers
pub(crate) struct SessionInner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) endpoints: Endpoints,
    pub(crate) description: DeviceDescription,
    pub(crate) settings: StreamSettings,
    pub(crate) compressor: Arc<dyn FrameCompressor>,
    handshake_complete: AtomicBool,
    handshake_state: AtomicU8,
    /// Code of the error that failed the handshake; 0 until then
    handshake_error: AtomicI32,
    viewer: Mutex<Option<ViewerParams>>,
    pub(crate) frame_slot: send::FrameSlot,
    workers: Mutex<WorkerSlots>,
}

impl SessionInner {
    pub(crate) fn is_handshake_complete(&self) -> bool {
        self.handshake_complete.load(Ordering::SeqCst)
    }

    /// Drop back to the non-operational state after a link failure
    pub(crate) fn clear_handshake(&self) {
        self.handshake_complete.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_state(&self, state: HandshakeState) {
        self.handshake_state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> HandshakeState {
        HandshakeState::from_u8(self.handshake_state.load(Ordering::SeqCst))
    }

    pub(crate) fn fail_handshake(&self, err: &Error) {
        self.handshake_error.store(err.code(), Ordering::SeqCst);
        self.set_state(HandshakeState::Failed);
    }

    fn handshake_error(&self) -> Option<i32> {
        match self.handshake_error.load(Ordering::SeqCst) {
            0 => None,
            code => Some(code),
        }
    }

    /// Publish the viewer parameters and mark the handshake complete
    pub(crate) fn complete_handshake(&self, params: ViewerParams) {
        *lock(&self.viewer) = Some(params);
        self.set_state(HandshakeState::Complete);
        self.handshake_complete.store(true, Ordering::SeqCst);
    }

    fn is_closing(&self) -> bool {
        lock(&self.workers).closing
    }

    /// Start a worker unless the session is closing or one is already running
    fn start_worker<F>(
        self: &Arc<Self>,
        slot: fn(&mut WorkerSlots) -> &mut Option<Worker>,
        name: &str,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce(Arc<SessionInner>, crate::worker::CancelToken) + Send + 'static,
    {
        let mut slots = lock(&self.workers);
        if slots.closing {
            return Err(Error::Closed);
        }
        let slot = slot(&mut slots);
        if slot.as_ref().is_some_and(|w| !w.is_finished()) {
            return Err(Error::AlreadyConnected);
        }

        let inner = Arc::clone(self);
        *slot = Some(Worker::spawn(name, move |token| body(inner, token))?);
        Ok(())
    }

    fn begin_read_loop<F>(self: &Arc<Self>, frame_size: usize, callback: F) -> Result<()>
    where
        F: FnMut(ReceiveEvent<'_>) + Send + 'static,
    {
        if self.is_closing() {
            return Err(Error::Closed);
        }
        if !self.is_handshake_complete() {
            return Err(Error::HandshakePending);
        }
        if frame_size == 0 {
            return Err(Error::InvalidFrame("read frame size must be non-zero".into()));
        }

        self.start_worker(
            |slots| &mut slots.receive,
            "tether-receive",
            move |inner, token| receive::run(&inner, &token, frame_size, callback),
        )
    }

    fn begin_send_loop<F>(self: &Arc<Self>, on_failure: F) -> Result<()>
    where
        F: FnOnce(Error) + Send + 'static,
    {
        if self.is_closing() {
            return Err(Error::Closed);
        }
        if !self.is_handshake_complete() {
            return Err(Error::HandshakePending);
        }

        self.start_worker(
            |slots| &mut slots.send,
            "tether-send",
            move |inner, token| send::run(&inner, &token, on_failure),
        )
    }
}

/// An opened accessory-mode device
///
/// Exclusively owned by whoever opened it. Dropping it closes it.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Build a session over an already claimed transport
    pub fn from_transport(
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
        description: DeviceDescription,
        compressor: Arc<dyn FrameCompressor>,
        settings: StreamSettings,
    ) -> Self {
        debug!(
            "Session {} using endpoints IN {:#04x} / OUT {:#04x}",
            description, endpoints.input, endpoints.output
        );
        Self {
            inner: Arc::new(SessionInner {
                transport,
                endpoints,
                description,
                settings,
                compressor,
                handshake_complete: AtomicBool::new(false),
                handshake_state: AtomicU8::new(HandshakeState::Idle as u8),
                handshake_error: AtomicI32::new(0),
                viewer: Mutex::new(None),
                frame_slot: send::FrameSlot::default(),
                workers: Mutex::new(WorkerSlots::default()),
            }),
        }
    }

    pub fn description(&self) -> &DeviceDescription {
        &self.inner.description
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.inner.description.identity
    }

    pub fn endpoints(&self) -> Endpoints {
        self.inner.endpoints
    }

    /// Wait for the viewer's handshake frame on a background thread
    ///
    /// `callback` runs once on the handshake thread with the outcome. It is
    /// not called if the session is closed first.
    pub fn wait_handshake_async<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.inner.start_worker(
            |slots| &mut slots.handshake,
            "tether-handshake",
            move |inner, token| handshake::run(&inner, &token, callback),
        )
    }

    /// Start the receive worker; requires a completed handshake
    pub fn begin_read_loop<F>(&self, frame_size: usize, callback: F) -> Result<()>
    where
        F: FnMut(ReceiveEvent<'_>) + Send + 'static,
    {
        self.inner.begin_read_loop(frame_size, callback)
    }

    /// Start the send worker; requires a completed handshake
    pub fn begin_send_loop<F>(&self, on_failure: F) -> Result<()>
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.inner.begin_send_loop(on_failure)
    }

    /// A non-owning handle for use inside callbacks
    pub fn link(&self) -> SessionLink {
        SessionLink {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Hand a captured image to the send worker without blocking
    pub fn submit_frame(
        &self,
        pixels: &[u8],
        width: u32,
        row_pitch: u32,
        height: u32,
    ) -> Result<SubmitStatus> {
        send::validate_frame(pixels, width, row_pitch, height, &self.inner.settings)?;
        if !self.is_handshake_complete() || !self.is_sending() {
            return Ok(SubmitStatus::NotStreaming);
        }
        Ok(self
            .inner
            .frame_slot
            .submit(pixels, width, row_pitch, height))
    }

    pub fn viewer_params(&self) -> Option<ViewerParams> {
        *lock(&self.inner.viewer)
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.inner.is_handshake_complete()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.inner.state()
    }

    /// Error code of a failed handshake
    pub fn handshake_error(&self) -> Option<i32> {
        self.inner.handshake_error()
    }

    /// Whether the send worker is alive
    pub fn is_sending(&self) -> bool {
        lock(&self.inner.workers)
            .send
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }

    /// Cancel all workers and wait for them to stop
    ///
    /// Idempotent. The wait is bounded by the teardown window; a worker that
    /// calls this from its own callback is not waited for.
    pub fn close(&self) {
        let workers = {
            let mut slots = lock(&self.inner.workers);
            if slots.closing {
                return;
            }
            slots.closing = true;
            slots.take_all()
        };

        for worker in &workers {
            worker.cancel();
        }
        self.inner.frame_slot.wake();

        let deadline = Instant::now() + self.inner.settings.teardown_window();
        let mut stopped = true;
        for worker in workers {
            stopped &= worker.join_until(deadline);
        }

        self.inner.clear_handshake();
        if stopped {
            info!("Closed session {}", self.inner.description);
        } else {
            warn!(
                "Closed session {} with workers still unwinding",
                self.inner.description
            );
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Weak reference to a session, handed to callbacks
///
/// Every operation fails with [`Error::Closed`] once the session is gone.
#[derive(Clone)]
pub struct SessionLink {
    inner: Weak<SessionInner>,
}

impl SessionLink {
    fn upgrade(&self) -> Result<Arc<SessionInner>> {
        self.inner.upgrade().ok_or(Error::Closed)
    }

    pub fn begin_read_loop<F>(&self, frame_size: usize, callback: F) -> Result<()>
    where
        F: FnMut(ReceiveEvent<'_>) + Send + 'static,
    {
        self.upgrade()?.begin_read_loop(frame_size, callback)
    }

    pub fn begin_send_loop<F>(&self, on_failure: F) -> Result<()>
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.upgrade()?.begin_send_loop(on_failure)
    }

    pub fn viewer_params(&self) -> Option<ViewerParams> {
        self.upgrade().ok().and_then(|inner| *lock(&inner.viewer))
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.upgrade()
            .map(|inner| inner.is_handshake_complete())
            .unwrap_or(false)
    }

    pub fn handshake_error(&self) -> Option<i32> {
        self.upgrade().ok().and_then(|inner| inner.handshake_error())
    }
}
