//! Common error types
//!
//! Every failure the tether can report maps to one variant here. Failures
//! that cross a callback or end up in a [`DisconnectReason`](crate::DisconnectReason)
//! are carried as the integer from [`Error::code`].

use thiserror::Error;

/// Base added to a libusb status for bulk-transfer failures
pub const TRANSPORT_CODE_BASE: i32 = -1000;
/// Code for image compression failures
pub const COMPRESSION_CODE: i32 = -2000;
/// Code for a malformed or missing handshake frame
pub const HANDSHAKE_PROTOCOL_CODE: i32 = -9;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No matching USB device found")]
    NotFound,

    #[error("Failed to read USB descriptors: {0}")]
    Descriptor(String),

    #[error("Failed to claim USB interface {interface}: {message}")]
    InterfaceClaim { interface: u8, message: String },

    #[error("Device reports accessory protocol version {0}, need at least 1")]
    BadProtocolVersion(i16),

    #[error("Control transfer (request {request}) to device failed: {message}")]
    Send { request: u8, message: String },

    #[error("Control transfer (request {request}) from device failed: {message}")]
    Receive { request: u8, message: String },

    #[error("Bulk transfer failed (libusb status {status})")]
    Transport { status: i32 },

    #[error("Image compression failed: {0}")]
    Compression(String),

    #[error("Handshake rejected: {0}")]
    HandshakeProtocol(#[from] protocol::ProtocolError),

    #[error("Frame rejected: {0}")]
    InvalidFrame(String),

    #[error("A device is already connected")]
    AlreadyConnected,

    #[error("Handshake has not completed")]
    HandshakePending,

    #[error("Session is closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable integer code; never 0, which means "user-initiated"
    pub fn code(&self) -> i32 {
        match self {
            Error::NotFound => -1,
            Error::Descriptor(_) => -2,
            Error::InterfaceClaim { .. } => -5,
            Error::Receive { .. } => -6,
            Error::Send { .. } => -7,
            Error::BadProtocolVersion(_) => -8,
            Error::HandshakeProtocol(_) => HANDSHAKE_PROTOCOL_CODE,
            Error::InvalidFrame(_) => -10,
            Error::AlreadyConnected => -11,
            Error::Closed => -12,
            Error::Config(_) => -13,
            Error::Io(_) => -14,
            Error::HandshakePending => -15,
            Error::Transport { status } => TRANSPORT_CODE_BASE + status,
            Error::Compression(_) => COMPRESSION_CODE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
