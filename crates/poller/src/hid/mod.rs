//! HID subsystem
//!
//! Device discovery, the open connection and the write-then-read
//! transaction protocol. Everything here is blocking and runs on the
//! dedicated device worker thread; the async side only ever sees a
//! [`common::DeviceBridge`].

pub mod backend;
pub mod handle;
pub mod locator;
pub mod transaction;
pub mod worker;

pub use backend::{HidApiBackend, HidBackend, HidConnection};
pub use handle::DeviceHandle;
pub use locator::{ACCEPTED_USAGES, DeviceLocator, DeviceMatcher, PRODUCT_ID, VENDOR_ID};
pub use transaction::{
    DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_READ_DELAY, TransactionChannel, TransactionTiming,
};
pub use worker::{DeviceWorkerThread, spawn_device_worker};
