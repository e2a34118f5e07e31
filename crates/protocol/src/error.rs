//! Protocol error types

use thiserror::Error;

/// Wire-format errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A tag byte did not hold the value the layout requires
    #[error("Tag mismatch at byte {offset}: expected {expected:#04x}, got {actual:#04x}")]
    TagMismatch {
        offset: usize,
        expected: u8,
        actual: u8,
    },

    /// Fewer bytes than the fixed layout needs
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// Payload length exceeds what the receiving side accepts
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// I/O error while reading or writing a stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
