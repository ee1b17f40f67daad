//! Common utilities for hid-poller
//!
//! This crate provides the pieces shared by the device worker and the polling
//! engine: the async channel bridge that funnels every HID transaction through
//! one worker thread, error handling, logging setup and test helpers.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use channel::{DeviceBridge, DeviceCommand, DeviceWorker, create_device_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
