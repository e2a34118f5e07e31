//! Accessory mode negotiation
//!
//! Switches a plain Android device into accessory mode. On success the phone
//! drops off the bus and comes back under one of the accessory product IDs;
//! finding it again is the caller's job.

use crate::usb::transport::Transport;
use common::{Error, Result};
use protocol::aoap::{
    REQUEST_GET_PROTOCOL, REQUEST_SEND_STRING, REQUEST_START, REQUEST_TYPE_VENDOR_IN,
    REQUEST_TYPE_VENDOR_OUT, decode_protocol_version, supports_accessory,
};
use protocol::{AccessoryIdentity, StringIndex};
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for each control transfer on endpoint 0
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

/// Run GET_PROTOCOL, six SEND_STRINGs and START
///
/// Fails fast: the first failed transfer is returned and nothing after it is
/// sent. Returns the protocol version the device reported.
pub fn convert_to_accessory(transport: &dyn Transport, identity: &AccessoryIdentity) -> Result<i16> {
    let version = read_protocol_version(transport)?;
    if !supports_accessory(version) {
        return Err(Error::BadProtocolVersion(version));
    }
    debug!("Device speaks accessory protocol version {}", version);

    for index in StringIndex::ALL {
        send_control(
            transport,
            REQUEST_SEND_STRING,
            index as u16,
            identity.payload(index),
        )?;
    }

    send_control(transport, REQUEST_START, 0, &[])?;

    info!(
        "Requested accessory mode as {} {}",
        identity.manufacturer, identity.model
    );
    Ok(version)
}

fn read_protocol_version(transport: &dyn Transport) -> Result<i16> {
    let mut buf = [0u8; 2];
    let len = transport
        .read_control(
            REQUEST_TYPE_VENDOR_IN,
            REQUEST_GET_PROTOCOL,
            0,
            0,
            &mut buf,
            CONTROL_TIMEOUT,
        )
        .map_err(|e| Error::Receive {
            request: REQUEST_GET_PROTOCOL,
            message: e.to_string(),
        })?;

    decode_protocol_version(&buf[..len]).ok_or_else(|| Error::Receive {
        request: REQUEST_GET_PROTOCOL,
        message: format!("expected 2 bytes, got {}", len),
    })
}

fn send_control(transport: &dyn Transport, request: u8, index: u16, data: &[u8]) -> Result<()> {
    transport
        .write_control(
            REQUEST_TYPE_VENDOR_OUT,
            request,
            0,
            index,
            data,
            CONTROL_TIMEOUT,
        )
        .map_err(|e| Error::Send {
            request,
            message: e.to_string(),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ControlRecord, MockTransport};

    #[test]
    fn test_full_negotiation() {
        let mock = MockTransport::new();
        mock.push_control_response(vec![2, 0]);

        let identity = AccessoryIdentity::default();
        assert_eq!(convert_to_accessory(&mock, &identity).unwrap(), 2);

        let controls = mock.controls();
        assert_eq!(controls.len(), 8);
        assert_eq!(
            controls[0],
            ControlRecord {
                request_type: 0xC0,
                request: 51,
                value: 0,
                index: 0,
                data: vec![2, 0],
            }
        );
        for (i, record) in controls[1..7].iter().enumerate() {
            assert_eq!(record.request_type, 0x40);
            assert_eq!(record.request, 52);
            assert_eq!(record.index, i as u16);
        }
        assert_eq!(controls[1].data, b"SiriusCybernetics");
        assert_eq!(controls[2].data, b"MayaUsb");
        assert_eq!(controls[6].data, b"42");
        assert_eq!(controls[7].request, 53);
        assert!(controls[7].data.is_empty());
    }

    #[test]
    fn test_version_zero_stops_negotiation() {
        let mock = MockTransport::new();
        mock.push_control_response(vec![0, 0]);

        let err = convert_to_accessory(&mock, &AccessoryIdentity::default()).unwrap_err();
        assert!(matches!(err, Error::BadProtocolVersion(0)));
        assert_eq!(err.code(), -8);
        // Only the GET_PROTOCOL transfer was issued
        assert_eq!(mock.controls().len(), 1);
    }

    #[test]
    fn test_get_protocol_failure_is_receive_error() {
        let mock = MockTransport::new();
        mock.fail_control(REQUEST_GET_PROTOCOL, rusb::Error::Pipe);

        let err = convert_to_accessory(&mock, &AccessoryIdentity::default()).unwrap_err();
        assert!(matches!(err, Error::Receive { request: 51, .. }));
        assert_eq!(err.code(), -6);
    }

    #[test]
    fn test_short_version_response() {
        let mock = MockTransport::new();
        mock.push_control_response(vec![1]);

        let err = convert_to_accessory(&mock, &AccessoryIdentity::default()).unwrap_err();
        assert!(matches!(err, Error::Receive { .. }));
    }

    #[test]
    fn test_send_string_failure_is_fail_fast() {
        let mock = MockTransport::new();
        mock.fail_control(REQUEST_SEND_STRING, rusb::Error::NoDevice);

        let err = convert_to_accessory(&mock, &AccessoryIdentity::default()).unwrap_err();
        assert!(matches!(err, Error::Send { request: 52, .. }));
        assert_eq!(err.code(), -7);
        // GET_PROTOCOL plus the first failed SEND_STRING, no START
        let controls = mock.controls();
        assert_eq!(controls.len(), 2);
        assert!(controls.iter().all(|c| c.request != REQUEST_START));
    }
}
