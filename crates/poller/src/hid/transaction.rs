//! Write-then-read transactions with self-healing
//!
//! A transaction is atomic from the caller's side: write the request, give
//! the device a moment, read the reply and check its status byte. If any
//! step fails the handle is dropped, so the next call starts again from
//! enumeration. That covers unplug/replug and devices that wedge after a
//! protocol error without any explicit reconnect logic.

use super::backend::HidBackend;
use super::handle::DeviceHandle;
use super::locator::DeviceLocator;
use protocol::{DeviceDescriptor, DeviceError, RequestFrame, ResponseFrame};
use std::time::Duration;
use tracing::{debug, trace};

/// Default pause between write and read
pub const DEFAULT_WRITE_READ_DELAY: Duration = Duration::from_millis(1);

/// Default time to wait for the response report
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timing applied to every transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionTiming {
    pub write_read_delay: Duration,
    pub read_timeout: Duration,
}

impl Default for TransactionTiming {
    fn default() -> Self {
        Self {
            write_read_delay: DEFAULT_WRITE_READ_DELAY,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Exclusive owner of the device handle
pub struct TransactionChannel<B: HidBackend> {
    backend: B,
    locator: DeviceLocator,
    timing: TransactionTiming,
    handle: Option<DeviceHandle<B::Connection>>,
}

impl<B: HidBackend> TransactionChannel<B> {
    pub fn new(backend: B, locator: DeviceLocator, timing: TransactionTiming) -> Self {
        Self {
            backend,
            locator,
            timing,
            handle: None,
        }
    }

    /// Run one transaction
    ///
    /// Opens the device first if no handle is held. Any error closes the
    /// handle before it is returned.
    pub fn transact(&mut self, request: &RequestFrame) -> Result<ResponseFrame, DeviceError> {
        match self.exchange(request) {
            Ok(response) => Ok(response),
            Err(e) => {
                debug!("Transaction failed ({}), dropping device handle", e);
                self.close();
                Err(e)
            }
        }
    }

    fn exchange(&mut self, request: &RequestFrame) -> Result<ResponseFrame, DeviceError> {
        let timing = self.timing;
        let handle = self.ensure_open()?;

        handle.write(request)?;
        if !timing.write_read_delay.is_zero() {
            std::thread::sleep(timing.write_read_delay);
        }
        let response = handle.read_with_timeout(timing.read_timeout)?;
        trace!("Response status {}", response.status());

        ResponseFrame::validate(response.into_bytes())
    }

    fn ensure_open(&mut self) -> Result<&mut DeviceHandle<B::Connection>, DeviceError> {
        if self.handle.is_none() {
            let descriptor = self.locator.find(&mut self.backend)?;
            let handle = DeviceHandle::open(&mut self.backend, descriptor)?;
            self.handle = Some(handle);
        }

        self.handle.as_mut().ok_or(DeviceError::DeviceNotFound)
    }

    /// Enumerate every attached HID interface
    pub fn list_devices(&mut self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        self.backend.enumerate()
    }

    /// Drop the device handle if one is held
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_open())
    }

    /// Descriptor of the currently open device
    pub fn current_device(&self) -> Option<&DeviceDescriptor> {
        self.handle.as_ref().map(|h| h.descriptor())
    }

    pub fn locator(&self) -> &DeviceLocator {
        &self.locator
    }
}
