//! Scripted transport, compressor and device opener for exercising sessions
//! and the tether without hardware
//!
//! # Example
//!
//! ```
//! use host::testing::{MockTransport, ReadStep};
//! use host::usb::Transport;
//! use std::time::Duration;
//!
//! let mock = MockTransport::new();
//! mock.push_read(ReadStep::Data(vec![1, 2, 3]));
//!
//! let mut buf = [0u8; 16];
//! assert_eq!(mock.read_bulk(0x81, &mut buf, Duration::from_millis(10)), Ok(3));
//! assert_eq!(
//!     mock.read_bulk(0x81, &mut buf, Duration::from_millis(10)),
//!     Err(rusb::Error::Timeout)
//! );
//! ```

use crate::compress::{FrameCompressor, FrameView};
use crate::config::StreamSettings;
use crate::session::{Endpoints, Session};
use crate::usb::{DeviceOpener, Transport};
use common::test_utils::create_mock_description;
use common::{DeviceDescription, DeviceIdentity, Error, Result};
use protocol::aoap::REQUEST_START;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Endpoint pair used by mock sessions
pub const MOCK_ENDPOINTS: Endpoints = Endpoints {
    input: 0x81,
    output: 0x02,
};

/// Outcome of the next bulk read
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Deliver these bytes (truncated to the caller's buffer)
    Data(Vec<u8>),
    /// Report a timeout immediately
    Timeout,
    /// Fail with this error
    Error(rusb::Error),
}

/// Outcome of the next bulk write
#[derive(Debug, Clone, Copy)]
pub enum WriteStep {
    Accept,
    /// Accept only the first `n` bytes
    Short(usize),
    Error(rusb::Error),
}

/// A recorded control transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    /// Bytes sent (OUT) or returned (IN)
    pub data: Vec<u8>,
}

#[derive(Default)]
struct MockState {
    reads: VecDeque<ReadStep>,
    writes_script: VecDeque<WriteStep>,
    writes: Vec<(u8, Vec<u8>)>,
    controls: Vec<ControlRecord>,
    control_responses: VecDeque<Vec<u8>>,
    control_failures: Vec<(u8, rusb::Error)>,
    write_delay: Duration,
}

/// In-memory [`Transport`]
///
/// Reads pop a queue of [`ReadStep`]s; once the queue is empty every read
/// waits for its timeout and reports `Timeout`, like an idle device. Writes
/// are accepted unless scripted otherwise, and recorded.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_read(&self, step: ReadStep) {
        self.state().reads.push_back(step);
    }

    pub fn push_reads(&self, steps: impl IntoIterator<Item = ReadStep>) {
        self.state().reads.extend(steps);
    }

    pub fn pending_reads(&self) -> usize {
        self.state().reads.len()
    }

    pub fn script_write(&self, step: WriteStep) {
        self.state().writes_script.push_back(step);
    }

    /// Delay every bulk write, simulating a slow link
    pub fn set_write_delay(&self, delay: Duration) {
        self.state().write_delay = delay;
    }

    /// Response for the next control IN transfer (default `[2, 0]`)
    pub fn push_control_response(&self, data: Vec<u8>) {
        self.state().control_responses.push_back(data);
    }

    /// Fail every control transfer with `request`
    pub fn fail_control(&self, request: u8, err: rusb::Error) {
        self.state().control_failures.push((request, err));
    }

    /// Every accepted bulk write as (endpoint, bytes)
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state().writes.clone()
    }

    pub fn controls(&self) -> Vec<ControlRecord> {
        self.state().controls.clone()
    }

    fn control_failure(&self, request: u8) -> Option<rusb::Error> {
        self.state()
            .control_failures
            .iter()
            .find(|(r, _)| *r == request)
            .map(|(_, e)| *e)
    }
}

impl Transport for MockTransport {
    fn read_bulk(&self, _endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        let step = self.state().reads.pop_front();
        match step {
            Some(ReadStep::Data(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Some(ReadStep::Timeout) => Err(rusb::Error::Timeout),
            Some(ReadStep::Error(e)) => Err(e),
            None => {
                thread::sleep(timeout);
                Err(rusb::Error::Timeout)
            }
        }
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        let delay = self.state().write_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.state();
        match state.writes_script.pop_front().unwrap_or(WriteStep::Accept) {
            WriteStep::Accept => {
                state.writes.push((endpoint, buf.to_vec()));
                Ok(buf.len())
            }
            WriteStep::Short(n) => {
                let n = n.min(buf.len());
                state.writes.push((endpoint, buf[..n].to_vec()));
                Ok(n)
            }
            WriteStep::Error(e) => Err(e),
        }
    }

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let failure = self.control_failure(request);
        let mut state = self.state();
        let response = match failure {
            Some(_) => Vec::new(),
            None => state.control_responses.pop_front().unwrap_or(vec![2, 0]),
        };
        let len = response.len().min(buf.len());
        buf[..len].copy_from_slice(&response[..len]);
        state.controls.push(ControlRecord {
            request_type,
            request,
            value,
            index,
            data: response[..len].to_vec(),
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(len),
        }
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let failure = self.control_failure(request);
        self.state().controls.push(ControlRecord {
            request_type,
            request,
            value,
            index,
            data: buf.to_vec(),
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(buf.len()),
        }
    }
}

/// Compressor that emits a fixed-size payload after an optional delay
pub struct StubCompressor {
    output_len: usize,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl StubCompressor {
    pub fn new(output_len: usize) -> Self {
        Self {
            output_len,
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every `compress` call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every `compress` call
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of `compress` calls started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrameCompressor for StubCompressor {
    fn compress(&self, frame: &FrameView<'_>, out: &mut Vec<u8>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail {
            return Err(Error::Compression("stub failure".into()));
        }

        out.clear();
        // First byte carries the frame width so tests can tell frames apart
        out.resize(self.output_len, frame.width as u8);
        Ok(())
    }
}

/// Stream settings with short timeouts so tests run quickly
pub fn fast_settings() -> StreamSettings {
    StreamSettings {
        poll_timeout_ms: 20,
        flush_timeout_ms: 5,
        ..StreamSettings::default()
    }
}

/// A session over `transport` describing an accessory-mode phone
pub fn mock_session(
    transport: Arc<MockTransport>,
    compressor: Arc<dyn FrameCompressor>,
    settings: StreamSettings,
) -> Session {
    Session::from_transport(
        transport,
        MOCK_ENDPOINTS,
        create_mock_description(0x18d1, 0x2d01),
        compressor,
        settings,
    )
}

/// How a device was opened through [`MockOpener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    /// Control transfers only, for negotiation
    Control,
    /// Claimed accessory interface
    Session,
}

/// A successful open recorded by [`MockOpener`]
#[derive(Debug, Clone, Copy)]
pub struct OpenRecord {
    pub kind: OpenKind,
    pub identity: DeviceIdentity,
    pub at: Instant,
}

/// A device that replaces `plain` on the bus once it has been sent START
struct Reenumeration {
    plain: Arc<MockTransport>,
    identity: DeviceIdentity,
    transport: Arc<MockTransport>,
}

#[derive(Default)]
struct OpenerState {
    attached: Vec<(DeviceIdentity, Arc<MockTransport>)>,
    reenumerations: Vec<Reenumeration>,
    opens: Vec<OpenRecord>,
}

impl OpenerState {
    /// Swap every started plain device for its accessory
    fn reenumerate(&mut self) {
        let (started, waiting): (Vec<_>, Vec<_>) =
            self.reenumerations.drain(..).partition(|r| {
                r.plain
                    .controls()
                    .iter()
                    .any(|c| c.request == REQUEST_START)
            });
        self.reenumerations = waiting;

        for r in started {
            self.attached.retain(|(_, t)| !Arc::ptr_eq(t, &r.plain));
            self.attached.push((r.identity, r.transport));
        }
    }
}

/// [`DeviceOpener`] over a set of attached mock devices
///
/// Candidates are matched in the caller's order, like the libusb opener.
/// Sessions use [`MOCK_ENDPOINTS`] and the opener's compressor.
pub struct MockOpener {
    state: Mutex<OpenerState>,
    compressor: Arc<dyn FrameCompressor>,
}

impl MockOpener {
    pub fn new(compressor: Arc<dyn FrameCompressor>) -> Self {
        Self {
            state: Mutex::new(OpenerState::default()),
            compressor,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, OpenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug in a device answering as `identity`
    pub fn attach(&self, identity: DeviceIdentity, transport: Arc<MockTransport>) {
        self.state().attached.push((identity, transport));
    }

    /// Plug in `identity` in place of `plain` once `plain` has been sent
    /// START, like a phone switching to accessory mode
    pub fn attach_after_start(
        &self,
        plain: &Arc<MockTransport>,
        identity: DeviceIdentity,
        transport: Arc<MockTransport>,
    ) {
        self.state().reenumerations.push(Reenumeration {
            plain: Arc::clone(plain),
            identity,
            transport,
        });
    }

    /// Every successful open, oldest first
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.state().opens.clone()
    }

    fn open(
        &self,
        kind: OpenKind,
        candidates: &[DeviceIdentity],
    ) -> Result<(Arc<MockTransport>, DeviceIdentity)> {
        let mut state = self.state();
        state.reenumerate();
        let (identity, transport) = candidates
            .iter()
            .find_map(|id| {
                state
                    .attached
                    .iter()
                    .find(|(attached, _)| attached == id)
                    .map(|(attached, transport)| (*attached, Arc::clone(transport)))
            })
            .ok_or(Error::NotFound)?;

        state.opens.push(OpenRecord {
            kind,
            identity,
            at: Instant::now(),
        });
        Ok((transport, identity))
    }
}

impl DeviceOpener for MockOpener {
    fn list(&self, _filters: &[String]) -> Result<Vec<DeviceDescription>> {
        let mut state = self.state();
        state.reenumerate();
        Ok(state
            .attached
            .iter()
            .map(|(id, _)| create_mock_description(id.vendor_id, id.product_id))
            .collect())
    }

    fn open_control(
        &self,
        candidates: &[DeviceIdentity],
    ) -> Result<(Arc<dyn Transport>, DeviceIdentity)> {
        let (transport, identity) = self.open(OpenKind::Control, candidates)?;
        let transport: Arc<dyn Transport> = transport;
        Ok((transport, identity))
    }

    fn open_session(
        &self,
        candidates: &[DeviceIdentity],
        settings: StreamSettings,
    ) -> Result<Session> {
        let (transport, identity) = self.open(OpenKind::Session, candidates)?;
        Ok(Session::from_transport(
            transport,
            MOCK_ENDPOINTS,
            create_mock_description(identity.vendor_id, identity.product_id),
            Arc::clone(&self.compressor),
            settings,
        ))
    }
}
