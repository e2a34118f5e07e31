//! USB device identities and filters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Google's vendor ID, which accessory-mode devices always report
pub const GOOGLE_VENDOR_ID: u16 = 0x18D1;

/// Product IDs a phone re-enumerates under once in accessory mode
pub const AOAP_IDS: [DeviceIdentity; 2] = [
    DeviceIdentity::new(GOOGLE_VENDOR_ID, 0x2D00), // accessory
    DeviceIdentity::new(GOOGLE_VENDOR_ID, 0x2D01), // accessory + ADB
];

/// Vendors whose devices are listed as Android phones
pub const ANDROID_VENDOR_IDS: [u16; 12] = [
    GOOGLE_VENDOR_ID,
    0x04E8, // Samsung
    0x0BB4, // HTC
    0x22B8, // Motorola
    0x1004, // LG
    0x0FCE, // Sony
    0x12D1, // Huawei
    0x2A70, // OnePlus
    0x2717, // Xiaomi
    0x0E8D, // MediaTek
    0x05C6, // Qualcomm
    0x1949, // Amazon
];

/// Vendor/product pair identifying a physical or accessory-mode device
///
/// Equality ignores `interface_index`, which only matters for driver
/// installation on composite devices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    #[serde(default)]
    pub interface_index: Option<u8>,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            interface_index: None,
        }
    }

    /// Whether this is one of the accessory-mode IDs
    pub fn is_accessory(&self) -> bool {
        AOAP_IDS.contains(self)
    }

    /// Whether this device is assumed to be an Android phone
    pub fn is_android(&self) -> bool {
        self.is_accessory() || ANDROID_VENDOR_IDS.contains(&self.vendor_id)
    }
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.vendor_id == other.vendor_id && self.product_id == other.product_id
    }
}

impl Eq for DeviceIdentity {}

impl std::hash::Hash for DeviceIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.vendor_id.hash(state);
        self.product_id.hash(state);
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

impl FromStr for DeviceIdentity {
    type Err = String;

    /// Parse `0xVVVV:0xPPPP` (the `0x` prefix is optional here)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vid, pid) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid device '{}', expected VID:PID", s))?;
        Ok(Self::new(parse_hex_id(vid, "VID")?, parse_hex_id(pid, "PID")?))
    }
}

/// A device found during enumeration, for listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub identity: DeviceIdentity,
    pub manufacturer: String,
    pub product: String,
}

impl DeviceDescription {
    pub fn is_accessory(&self) -> bool {
        self.identity.is_accessory()
    }
}

impl fmt::Display for DeviceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.identity, self.manufacturer, self.product)
    }
}

/// Parse a hex ID with an optional `0x`/`0X` prefix
pub fn parse_hex_id(id: &str, name: &str) -> Result<u16, String> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);
    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(format!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name, id
        ));
    }
    u16::from_str_radix(hex_part, 16)
        .map_err(|_| format!("Invalid {} '{}', not a valid hex number", name, id))
}

/// Check whether a VID/PID pair matches any `0xVID:0xPID` / `0xVID:*` / `*:*`
/// filter
///
/// An empty filter list matches nothing.
pub fn matches_filter(vid: u16, pid: u16, filters: &[String]) -> bool {
    filters.iter().any(|filter| {
        let Some((filter_vid, filter_pid)) = filter.split_once(':') else {
            return false;
        };

        let vid_match = filter_vid == "*" || parse_hex_id(filter_vid, "VID") == Ok(vid);
        let pid_match = filter_pid == "*" || parse_hex_id(filter_pid, "PID") == Ok(pid);
        vid_match && pid_match
    })
}
