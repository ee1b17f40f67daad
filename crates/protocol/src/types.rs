//! Device and notification type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event name used when a state change is forwarded to a UI layer
pub const STATE_CHANGED_EVENT: &str = "hid-device-state-changed";

/// HID `(usage_page, usage)` pair identifying a logical interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsagePair {
    pub usage_page: u16,
    pub usage: u16,
}

impl UsagePair {
    pub const fn new(usage_page: u16, usage: u16) -> Self {
        Self { usage_page, usage }
    }
}

impl fmt::Display for UsagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}/{:#06x}", self.usage_page, self.usage)
    }
}

/// One enumerated HID interface
///
/// Produced by enumeration and only used to pick the interface to open; the
/// path is the sole thing carried forward into the open call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// HID usage page of this interface
    pub usage_page: u16,
    /// HID usage within the page
    pub usage: u16,
    /// OS path of the interface (opaque)
    pub path: String,
    /// Product string, when the OS reports one
    #[serde(default)]
    pub product: Option<String>,
    /// Interface number, `-1` when not applicable
    #[serde(default = "DeviceDescriptor::no_interface")]
    pub interface_number: i32,
}

impl DeviceDescriptor {
    fn no_interface() -> i32 {
        -1
    }

    pub fn usage_pair(&self) -> UsagePair {
        UsagePair::new(self.usage_page, self.usage)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} usage {} ({})",
            self.vendor_id,
            self.product_id,
            self.usage_pair(),
            self.path
        )
    }
}

/// Notification emitted for every successful poll
///
/// The payload is handed over untouched; interpreting it is up to whoever
/// consumes the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStateChanged {
    /// Monotonic per-engine counter, starting at 0
    pub sequence: u64,
    /// Status byte of the response (always 0 for delivered events)
    pub status: u8,
    /// Response bytes after the status byte
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl DeviceStateChanged {
    /// JSON body for forwarding under [`STATE_CHANGED_EVENT`]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
