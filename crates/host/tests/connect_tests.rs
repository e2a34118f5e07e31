//! Connect path tests
//!
//! Drives `Tether::connect` and `Tether::connect_any` against mock devices:
//! opening an accessory directly, negotiating a plain phone and reopening it
//! after re-enumeration, and failing without leaving anything behind.

use common::test_utils::{DEFAULT_TEST_TIMEOUT, wait_until};
use common::{DeviceIdentity, DisconnectReason, Error, EventReceiver, TetherEvent};
use host::Tether;
use host::config::HostConfig;
use host::testing::{MockOpener, MockTransport, OpenKind, ReadStep, StubCompressor, fast_settings};
use protocol::aoap::{REQUEST_GET_PROTOCOL, REQUEST_SEND_STRING, REQUEST_START};
use std::sync::Arc;
use std::time::Duration;

const PLAIN: DeviceIdentity = DeviceIdentity::new(0x18d1, 0x4ee2);
const ACCESSORY: DeviceIdentity = DeviceIdentity::new(0x18d1, 0x2d01);
const SETTLE_DELAY_MS: u64 = 50;

/// Handshake frame announcing a 640x480 viewer
fn handshake_frame() -> Vec<u8> {
    vec![
        0x27, 0x28, 0x00, 0x00, 0x02, 0x80, 0x29, 0x00, 0x00, 0x01, 0xE0, 0x2A, 0x00, 0x00, 0x00,
        0x00,
    ]
}

/// An accessory-mode phone that will send its handshake once read
fn accessory_device() -> Arc<MockTransport> {
    let mock = Arc::new(MockTransport::new());
    mock.push_reads([ReadStep::Timeout, ReadStep::Data(handshake_frame())]);
    mock
}

fn setup() -> (Tether, Arc<MockOpener>) {
    let opener = Arc::new(MockOpener::new(Arc::new(StubCompressor::new(64))));
    let mut config = HostConfig {
        stream: fast_settings(),
        ..HostConfig::default()
    };
    config.usb.candidates = vec!["0x18d1:0x4ee2".to_string()];
    config.usb.settle_delay_ms = SETTLE_DELAY_MS;

    let tether = Tether::with_opener(opener.clone(), config);
    (tether, opener)
}

fn opened(opener: &MockOpener) -> Vec<(OpenKind, DeviceIdentity)> {
    opener
        .opens()
        .iter()
        .map(|record| (record.kind, record.identity))
        .collect()
}

fn wait_for_streaming(events: &EventReceiver) {
    let mut seen = Vec::new();
    assert!(
        wait_until(DEFAULT_TEST_TIMEOUT, || {
            seen.extend(events.drain());
            seen.iter()
                .any(|e| matches!(e, TetherEvent::Streaming { .. }))
        }),
        "never streamed: {:?}",
        seen
    );
    assert!(matches!(seen[0], TetherEvent::Connected { .. }));
}

#[test]
fn test_accessory_identity_opened_directly() {
    let (tether, opener) = setup();
    let events = tether.events();
    let accessory = accessory_device();
    opener.attach(ACCESSORY, Arc::clone(&accessory));

    tether.connect(ACCESSORY).unwrap();

    assert_eq!(opened(&opener), vec![(OpenKind::Session, ACCESSORY)]);
    assert!(accessory.controls().is_empty());
    wait_for_streaming(&events);
    assert_eq!(tether.device().map(|d| d.identity), Some(ACCESSORY));

    tether.disconnect(DisconnectReason::User);
}

#[test]
fn test_plain_identity_negotiated_then_reopened() {
    let (tether, opener) = setup();
    let events = tether.events();
    let plain = Arc::new(MockTransport::new());
    opener.attach(PLAIN, Arc::clone(&plain));
    opener.attach_after_start(&plain, ACCESSORY, accessory_device());

    tether.connect(PLAIN).unwrap();

    let opens = opener.opens();
    assert_eq!(
        opened(&opener),
        vec![(OpenKind::Control, PLAIN), (OpenKind::Session, ACCESSORY)]
    );
    // Reopened only after the settle delay
    assert!(opens[1].at - opens[0].at >= Duration::from_millis(SETTLE_DELAY_MS));

    let requests: Vec<u8> = plain.controls().iter().map(|c| c.request).collect();
    assert_eq!(requests.len(), 8);
    assert_eq!(requests[0], REQUEST_GET_PROTOCOL);
    assert!(requests[1..7].iter().all(|r| *r == REQUEST_SEND_STRING));
    assert_eq!(requests[7], REQUEST_START);

    wait_for_streaming(&events);
    tether.disconnect(DisconnectReason::User);
}

#[test]
fn test_bad_protocol_version_leaves_no_state() {
    let (tether, opener) = setup();
    let events = tether.events();
    let plain = Arc::new(MockTransport::new());
    plain.push_control_response(vec![0, 0]);
    opener.attach(PLAIN, Arc::clone(&plain));
    opener.attach_after_start(&plain, ACCESSORY, accessory_device());

    let err = tether.connect(PLAIN).unwrap_err();
    assert!(matches!(err, Error::BadProtocolVersion(0)));
    assert_eq!(err.code(), -8);

    // Nothing after GET_PROTOCOL, and no accessory was opened
    assert_eq!(plain.controls().len(), 1);
    assert_eq!(opened(&opener), vec![(OpenKind::Control, PLAIN)]);
    assert!(!tether.is_connected());
    assert!(events.drain().is_empty());
}

#[test]
fn test_send_string_failure_propagates() {
    let (tether, opener) = setup();
    let plain = Arc::new(MockTransport::new());
    plain.fail_control(REQUEST_SEND_STRING, rusb::Error::Pipe);
    opener.attach(PLAIN, Arc::clone(&plain));

    let err = tether.connect(PLAIN).unwrap_err();
    assert_eq!(err.code(), -7);
    assert_eq!(opened(&opener).len(), 1);
    assert!(!tether.is_connected());
}

#[test]
fn test_connect_any_uses_attached_accessory() {
    let (tether, opener) = setup();
    let plain = Arc::new(MockTransport::new());
    opener.attach(PLAIN, Arc::clone(&plain));
    opener.attach(ACCESSORY, accessory_device());

    tether.connect_any().unwrap();

    assert_eq!(opened(&opener), vec![(OpenKind::Session, ACCESSORY)]);
    assert!(plain.controls().is_empty());
    tether.disconnect(DisconnectReason::User);
}

#[test]
fn test_connect_any_negotiates_candidate() {
    let (tether, opener) = setup();
    let events = tether.events();
    let plain = Arc::new(MockTransport::new());
    opener.attach(PLAIN, Arc::clone(&plain));
    opener.attach_after_start(&plain, ACCESSORY, accessory_device());

    tether.connect_any().unwrap();

    assert_eq!(
        opened(&opener),
        vec![(OpenKind::Control, PLAIN), (OpenKind::Session, ACCESSORY)]
    );
    wait_for_streaming(&events);
    tether.disconnect(DisconnectReason::User);
}

#[test]
fn test_nothing_attached() {
    let (tether, opener) = setup();

    assert!(matches!(tether.connect_any(), Err(Error::NotFound)));
    assert!(matches!(tether.connect(PLAIN), Err(Error::NotFound)));
    assert!(opener.opens().is_empty());
    assert!(tether.events().drain().is_empty());
}

#[test]
fn test_connect_while_connected() {
    let (tether, opener) = setup();
    opener.attach(ACCESSORY, accessory_device());
    tether.connect(ACCESSORY).unwrap();

    let err = tether.connect(ACCESSORY).unwrap_err();
    assert!(matches!(err, Error::AlreadyConnected));
    assert!(matches!(tether.connect_any(), Err(Error::AlreadyConnected)));
    assert_eq!(opener.opens().len(), 1);

    tether.disconnect(DisconnectReason::User);
}

#[test]
fn test_list_devices_reflects_reenumeration() {
    let (tether, opener) = setup();
    let plain = Arc::new(MockTransport::new());
    opener.attach(PLAIN, Arc::clone(&plain));
    opener.attach_after_start(&plain, ACCESSORY, accessory_device());

    let before = tether.list_devices().unwrap();
    assert_eq!(before.len(), 1);
    assert!(!before[0].is_accessory());

    tether.connect(PLAIN).unwrap();
    let after = tether.list_devices().unwrap();
    assert_eq!(after.len(), 1);
    assert!(after[0].is_accessory());

    tether.disconnect(DisconnectReason::User);
}
