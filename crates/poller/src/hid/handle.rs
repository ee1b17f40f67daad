//! Open device connection

use super::backend::{HidBackend, HidConnection};
use protocol::{DeviceDescriptor, DeviceError, REPORT_SIZE, RequestFrame, ResponseFrame};
use std::time::Duration;
use tracing::{debug, trace};

/// Owns one open connection to the device
///
/// Not shareable; [`super::TransactionChannel`] is the only owner. Once
/// closed, every I/O call fails until a new handle is opened.
pub struct DeviceHandle<C: HidConnection> {
    connection: Option<C>,
    descriptor: DeviceDescriptor,
}

impl<C: HidConnection> DeviceHandle<C> {
    /// Open the interface described by `descriptor`
    pub fn open<B>(backend: &mut B, descriptor: DeviceDescriptor) -> Result<Self, DeviceError>
    where
        B: HidBackend<Connection = C>,
    {
        let connection = backend.open(&descriptor)?;
        debug!("Opened device {}", descriptor);

        Ok(Self {
            connection: Some(connection),
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Write a request frame
    pub fn write(&mut self, frame: &RequestFrame) -> Result<(), DeviceError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| DeviceError::WriteFailed("device handle is closed".into()))?;

        let bytes = frame.to_bytes();
        let written = connection.write(&bytes)?;
        trace!("Wrote {} of {} bytes", written, bytes.len());
        Ok(())
    }

    /// Read one input report
    ///
    /// Nothing arriving within `timeout` is [`DeviceError::ReadTimedOut`].
    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<ResponseFrame, DeviceError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| DeviceError::ReadFailed("device handle is closed".into()))?;

        let mut buf = [0u8; REPORT_SIZE];
        let len = connection.read_timeout(&mut buf, timeout)?;
        trace!("Read {} bytes", len);

        ResponseFrame::from_bytes(buf[..len].to_vec())
    }

    /// Release the connection; calling it again does nothing
    pub fn close(&mut self) {
        if self.connection.take().is_some() {
            debug!("Closed device {}", self.descriptor.path);
        }
    }
}
