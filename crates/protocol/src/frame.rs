//! Request and response frames
//!
//! Outbound frames are `[report_id][command_id][payload...]`, inbound frames
//! are `[status][payload...]`. Nothing past the status byte is interpreted
//! here.

use crate::error::{DeviceError, Result};
use serde::{Deserialize, Serialize};

/// Report id used for every outbound command
pub const REPORT_ID: u8 = 0;

/// Command id that queries the current device state
pub const CMD_GET_DEVICE_STATE: u8 = 9;

/// Status byte of a successful response
pub const STATUS_SUCCESS: u8 = 0;

/// Size of the input report buffer handed to the device read
pub const REPORT_SIZE: usize = 64;

/// Outbound command frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    report_id: u8,
    command_id: u8,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
}

impl RequestFrame {
    /// Build a frame for `command_id` with an explicit report id
    pub fn new(report_id: u8, command_id: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            report_id,
            command_id,
            payload: payload.into(),
        }
    }

    /// Build a frame on the default report id
    pub fn command(command_id: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(REPORT_ID, command_id, payload)
    }

    /// The state query sent on every poll iteration
    pub fn query_device_state() -> Self {
        Self::command(CMD_GET_DEVICE_STATE, Vec::new())
    }

    pub fn report_id(&self) -> u8 {
        self.report_id
    }

    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Wire bytes, report id first
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.payload.len());
        bytes.push(self.report_id);
        bytes.push(self.command_id);
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Inbound response frame
///
/// Only frames with a leading status byte can be constructed; use
/// [`ResponseFrame::validate`] to turn raw bytes into a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
}

impl ResponseFrame {
    /// Wrap raw bytes read from the device
    ///
    /// An empty read carries no status byte and is reported the same way as
    /// a read that never returned.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(DeviceError::ReadTimedOut);
        }
        Ok(Self { bytes })
    }

    /// Wrap raw bytes and require a zero status byte
    pub fn validate(bytes: Vec<u8>) -> Result<Self> {
        let frame = Self::from_bytes(bytes)?;
        match frame.status() {
            STATUS_SUCCESS => Ok(frame),
            code => Err(DeviceError::CommunicationError(code)),
        }
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    pub fn is_success(&self) -> bool {
        self.status() == STATUS_SUCCESS
    }

    /// Everything after the status byte
    pub fn payload(&self) -> &[u8] {
        &self.bytes[1..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
