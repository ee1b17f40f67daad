//! Device discovery
//!
//! Picks the one HID interface the poller talks to out of everything the OS
//! enumerates. A composite keyboard exposes several interfaces under the
//! same vendor/product ids; only the vendor-defined collections accept
//! command frames, so the usage pair has to match as well.

use super::backend::HidBackend;
use protocol::{DeviceDescriptor, DeviceError, UsagePair};
use tracing::debug;

/// USB vendor id of the supported device
pub const VENDOR_ID: u16 = 0x37a8;

/// USB product id of the supported device
pub const PRODUCT_ID: u16 = 0x0003;

/// Usage pairs of the interfaces that accept command frames
pub const ACCEPTED_USAGES: [UsagePair; 2] = [UsagePair::new(128, 129), UsagePair::new(65280, 1)];

/// Identity of the target interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatcher {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usages: Vec<UsagePair>,
}

impl Default for DeviceMatcher {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
            usages: ACCEPTED_USAGES.to_vec(),
        }
    }
}

impl DeviceMatcher {
    pub fn matches(&self, descriptor: &DeviceDescriptor) -> bool {
        descriptor.vendor_id == self.vendor_id
            && descriptor.product_id == self.product_id
            && self.usages.contains(&descriptor.usage_pair())
    }
}

/// Finds the device to open
#[derive(Debug, Clone, Default)]
pub struct DeviceLocator {
    matcher: DeviceMatcher,
}

impl DeviceLocator {
    pub fn new(matcher: DeviceMatcher) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &DeviceMatcher {
        &self.matcher
    }

    /// Enumerate attached devices and return the first matching interface
    pub fn find<B: HidBackend>(&self, backend: &mut B) -> Result<DeviceDescriptor, DeviceError> {
        let devices = backend.enumerate()?;
        match self.select(&devices) {
            Some(descriptor) => {
                debug!("Located device {}", descriptor);
                Ok(descriptor.clone())
            }
            None => {
                debug!(
                    "No matching device among {} HID interfaces",
                    devices.len()
                );
                Err(DeviceError::DeviceNotFound)
            }
        }
    }

    /// First matching interface in enumeration order
    pub fn select<'a>(&self, devices: &'a [DeviceDescriptor]) -> Option<&'a DeviceDescriptor> {
        devices.iter().find(|d| self.matcher.matches(d))
    }
}
