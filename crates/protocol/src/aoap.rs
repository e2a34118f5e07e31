//! Android Open Accessory Protocol constants
//!
//! A plain Android device is switched into accessory mode with vendor-class
//! control transfers on endpoint 0: query the protocol version, send six
//! identifying strings, then start. The device then re-enumerates under an
//! accessory product ID.

use serde::{Deserialize, Serialize};

/// Get protocol version (device -> host, 2-byte little-endian integer)
pub const REQUEST_GET_PROTOCOL: u8 = 51;
/// Send identifying string (host -> device, `index` selects the field)
pub const REQUEST_SEND_STRING: u8 = 52;
/// Start accessory mode (host -> device, no payload)
pub const REQUEST_START: u8 = 53;

/// bmRequestType for vendor requests, host -> device
pub const REQUEST_TYPE_VENDOR_OUT: u8 = 0x40;
/// bmRequestType for vendor requests, device -> host
pub const REQUEST_TYPE_VENDOR_IN: u8 = 0xC0;

/// Lowest protocol version that supports accessory mode
pub const MIN_PROTOCOL_VERSION: i16 = 1;

/// Longest string sent in a single SEND_STRING transfer
pub const MAX_STRING_LEN: usize = 255;

/// String slots of the SEND_STRING request, in protocol order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StringIndex {
    Manufacturer = 0,
    Model = 1,
    Description = 2,
    Version = 3,
    Uri = 4,
    Serial = 5,
}

impl StringIndex {
    pub const ALL: [StringIndex; 6] = [
        StringIndex::Manufacturer,
        StringIndex::Model,
        StringIndex::Description,
        StringIndex::Version,
        StringIndex::Uri,
        StringIndex::Serial,
    ];
}

/// Identity announced to the phone during negotiation
///
/// The phone-side app declares an accessory filter on manufacturer and model,
/// so the defaults must match it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryIdentity {
    pub manufacturer: String,
    pub model: String,
    pub description: String,
    pub version: String,
    pub uri: String,
    pub serial: String,
}

impl Default for AccessoryIdentity {
    fn default() -> Self {
        Self {
            manufacturer: "SiriusCybernetics".to_string(),
            model: "MayaUsb".to_string(),
            description: "Maya USB streaming".to_string(),
            version: "0.42".to_string(),
            uri: "https://sdao.me".to_string(),
            serial: "42".to_string(),
        }
    }
}

impl AccessoryIdentity {
    /// String for a SEND_STRING slot
    pub fn field(&self, index: StringIndex) -> &str {
        match index {
            StringIndex::Manufacturer => &self.manufacturer,
            StringIndex::Model => &self.model,
            StringIndex::Description => &self.description,
            StringIndex::Version => &self.version,
            StringIndex::Uri => &self.uri,
            StringIndex::Serial => &self.serial,
        }
    }

    /// Payload bytes for a SEND_STRING slot, truncated to [`MAX_STRING_LEN`]
    pub fn payload(&self, index: StringIndex) -> &[u8] {
        let bytes = self.field(index).as_bytes();
        &bytes[..bytes.len().min(MAX_STRING_LEN)]
    }
}

/// Decode the GET_PROTOCOL response (little-endian, as the device sends it)
pub fn decode_protocol_version(buf: &[u8]) -> Option<i16> {
    match buf {
        [lo, hi, ..] => Some(i16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Whether a reported version supports accessory mode
pub fn supports_accessory(version: i16) -> bool {
    version >= MIN_PROTOCOL_VERSION
}
