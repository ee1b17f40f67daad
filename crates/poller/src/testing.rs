//! Scriptable in-memory HID backend
//!
//! Lets the locator, transaction channel, worker thread and polling engine
//! run without hardware. Every clone of a [`MockBackend`] shares the same
//! state, so a test can keep one clone for scripting and assertions while
//! the worker thread owns another.
//!
//! # Example
//!
//! ```
//! use poller::hid::{DeviceLocator, TransactionChannel, TransactionTiming};
//! use poller::testing::MockBackend;
//! use protocol::RequestFrame;
//!
//! let backend = MockBackend::with_target_device();
//! backend.push_frame(vec![0, 42]);
//!
//! let mut channel = TransactionChannel::new(
//!     backend.clone(),
//!     DeviceLocator::default(),
//!     TransactionTiming::default(),
//! );
//! let response = channel.transact(&RequestFrame::query_device_state()).unwrap();
//! assert_eq!(response.payload(), &[42]);
//! assert_eq!(backend.opens(), 1);
//! ```

use crate::hid::{HidBackend, HidConnection, PRODUCT_ID, VENDOR_ID};
use common::test_utils::create_mock_descriptor_list;
use protocol::{DeviceDescriptor, DeviceError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Scripted outcome of one write or read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Read returns these bytes
    Frame(Vec<u8>),
    /// Read returns nothing within the timeout
    Timeout,
    /// Read fails with an OS error
    ReadError(String),
    /// The next write fails
    WriteError(String),
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<DeviceDescriptor>,
    enumerate_error: Option<String>,
    open_failures: VecDeque<String>,
    responses: VecDeque<MockResponse>,
    default_frame: Option<Vec<u8>>,
    read_delay: Duration,
    enumerations: usize,
    opens: usize,
    closes: usize,
    writes: Vec<Vec<u8>>,
    last_read_timeout: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory HID backend
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Backend with no attached devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend exposing a composite keyboard whose vendor interface matches
    /// the default locator
    pub fn with_target_device() -> Self {
        let backend = Self::new();
        backend.set_devices(create_mock_descriptor_list(VENDOR_ID, PRODUCT_ID, (65280, 1)));
        backend
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Scripting

    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        self.state().devices = devices;
    }

    /// Simulate unplugging everything
    pub fn unplug(&self) {
        self.state().devices.clear();
    }

    pub fn fail_enumeration(&self, reason: Option<&str>) {
        self.state().enumerate_error = reason.map(str::to_owned);
    }

    pub fn fail_next_open(&self, reason: &str) {
        self.state().open_failures.push_back(reason.to_owned());
    }

    pub fn push_response(&self, response: MockResponse) {
        self.state().responses.push_back(response);
    }

    pub fn push_frame(&self, bytes: Vec<u8>) {
        self.push_response(MockResponse::Frame(bytes));
    }

    /// Frame returned once the scripted queue is empty; `None` means timeout
    pub fn set_default_frame(&self, bytes: Option<Vec<u8>>) {
        self.state().default_frame = bytes;
    }

    /// Make every read take this long before returning
    pub fn set_read_delay(&self, delay: Duration) {
        self.state().read_delay = delay;
    }

    // Observations

    pub fn enumerations(&self) -> usize {
        self.state().enumerations
    }

    pub fn opens(&self) -> usize {
        self.state().opens
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    /// Connections opened and not yet dropped
    pub fn open_connections(&self) -> usize {
        let state = self.state();
        state.opens - state.closes
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    pub fn last_read_timeout(&self) -> Option<Duration> {
        self.state().last_read_timeout
    }

    /// Whether a write has happened without its matching read yet
    pub fn is_in_flight(&self) -> bool {
        self.state().in_flight > 0
    }

    /// Highest number of overlapping write/read exchanges seen
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }
}

impl HidBackend for MockBackend {
    type Connection = MockConnection;

    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        let mut state = self.state();
        state.enumerations += 1;
        match &state.enumerate_error {
            Some(reason) => Err(DeviceError::Enumeration(reason.clone())),
            None => Ok(state.devices.clone()),
        }
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Connection, DeviceError> {
        let mut state = self.state();
        if let Some(reason) = state.open_failures.pop_front() {
            return Err(DeviceError::OpenFailed(reason));
        }
        if !state.devices.iter().any(|d| d.path == descriptor.path) {
            return Err(DeviceError::OpenFailed(format!(
                "{}: no such device",
                descriptor.path
            )));
        }
        state.opens += 1;

        Ok(MockConnection {
            state: self.state.clone(),
        })
    }
}

/// Connection handed out by [`MockBackend`]
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HidConnection for MockConnection {
    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
        let mut state = self.state();
        let fail = matches!(state.responses.front(), Some(MockResponse::WriteError(_)));
        if fail && let Some(MockResponse::WriteError(reason)) = state.responses.pop_front() {
            return Err(DeviceError::WriteFailed(reason));
        }

        state.writes.push(data.to_vec());
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        Ok(data.len())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError> {
        let delay = {
            let mut state = self.state();
            state.last_read_timeout = Some(timeout);
            state.read_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state();
        state.in_flight = state.in_flight.saturating_sub(1);
        let response = match state.responses.pop_front() {
            Some(response) => response,
            None => match &state.default_frame {
                Some(bytes) => MockResponse::Frame(bytes.clone()),
                None => MockResponse::Timeout,
            },
        };

        match response {
            MockResponse::Frame(bytes) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            MockResponse::Timeout => Ok(0),
            MockResponse::ReadError(reason) => Err(DeviceError::ReadFailed(reason)),
            MockResponse::WriteError(reason) => Err(DeviceError::ReadFailed(reason)),
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state().closes += 1;
    }
}
