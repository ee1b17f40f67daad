//! HID backend abstraction
//!
//! The locator, handle and transaction channel only see these two traits.
//! [`HidApiBackend`] talks to real hardware through `hidapi`; tests plug in
//! [`crate::testing::MockBackend`].

use hidapi::{DeviceInfo, HidApi, HidDevice};
use protocol::{DeviceDescriptor, DeviceError};
use std::ffi::CString;
use std::time::Duration;
use tracing::trace;

/// One open OS-level HID connection
pub trait HidConnection {
    /// Write one output report; the first byte is the report id
    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError>;

    /// Read one input report, returning 0 if nothing arrived within `timeout`
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError>;
}

/// Source of HID enumeration and connections
pub trait HidBackend {
    type Connection: HidConnection;

    /// List every currently attached HID interface
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, DeviceError>;

    /// Open the interface at `descriptor.path`
    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Connection, DeviceError>;
}

/// Backend over the platform HID library
pub struct HidApiBackend {
    api: HidApi,
}

impl HidApiBackend {
    pub fn new() -> Result<Self, DeviceError> {
        let api = HidApi::new().map_err(|e| DeviceError::Enumeration(e.to_string()))?;
        Ok(Self { api })
    }
}

impl HidBackend for HidApiBackend {
    type Connection = HidDevice;

    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        // The device list is a snapshot taken at the last refresh
        self.api
            .refresh_devices()
            .map_err(|e| DeviceError::Enumeration(e.to_string()))?;

        let devices: Vec<_> = self.api.device_list().map(descriptor_from_info).collect();
        trace!("Enumerated {} HID interfaces", devices.len());
        Ok(devices)
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Connection, DeviceError> {
        let path = CString::new(descriptor.path.as_str())
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;

        // The device may have been unplugged since enumeration
        self.api
            .open_path(&path)
            .map_err(|e| DeviceError::OpenFailed(format!("{}: {}", descriptor.path, e)))
    }
}

impl HidConnection for HidDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
        HidDevice::write(self, data).map_err(|e| DeviceError::WriteFailed(e.to_string()))
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        HidDevice::read_timeout(self, buf, millis).map_err(|e| DeviceError::ReadFailed(e.to_string()))
    }
}

fn descriptor_from_info(info: &DeviceInfo) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        usage_page: info.usage_page(),
        usage: info.usage(),
        path: info.path().to_string_lossy().into_owned(),
        product: info.product_string().map(str::to_owned),
        interface_number: info.interface_number(),
    }
}
