//! Device error taxonomy
//!
//! Every failure a transaction can hit maps onto one of these variants. The
//! transaction channel invalidates its handle before handing any of them back
//! to the caller, so the variant only describes *what* went wrong.

use thiserror::Error;

/// Errors raised while locating, opening or talking to the HID device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// No attached HID interface matched the configured identifiers
    #[error("Device not found")]
    DeviceNotFound,

    /// The OS enumeration call itself failed
    #[error("HID enumeration failed: {0}")]
    Enumeration(String),

    /// The OS refused to open the selected interface (e.g. it was unplugged
    /// between enumeration and open)
    #[error("Failed to open HID device: {0}")]
    OpenFailed(String),

    /// Writing the request frame failed
    #[error("Failed to write request frame: {0}")]
    WriteFailed(String),

    /// The read call returned an OS error
    #[error("Failed to read response frame: {0}")]
    ReadFailed(String),

    /// No response arrived within the read timeout
    #[error("Timed out waiting for a response from the device")]
    ReadTimedOut,

    /// The device answered with a non-zero status byte
    #[error("Communications error with device. Response code: {0}")]
    CommunicationError(u8),

    /// The worker thread owning the device is no longer running
    #[error("Device worker unavailable: {0}")]
    WorkerUnavailable(String),
}

impl DeviceError {
    /// Status byte carried by a [`DeviceError::CommunicationError`]
    pub fn status_code(&self) -> Option<u8> {
        match self {
            DeviceError::CommunicationError(code) => Some(*code),
            _ => None,
        }
    }
}

/// Type alias for device results
pub type Result<T> = std::result::Result<T, DeviceError>;
