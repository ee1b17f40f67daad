//! Protocol library for hid-poller
//!
//! This crate defines the vocabulary shared by the device worker and the
//! polling engine: the request/response frames exchanged with the HID
//! peripheral, the enumerated device descriptor, the device error taxonomy
//! and the state-change notification handed to consumers.
//!
//! # Example
//!
//! ```
//! use protocol::{DeviceError, RequestFrame, ResponseFrame};
//!
//! // The poll query: report id 0, command id 9
//! let request = RequestFrame::query_device_state();
//! assert_eq!(request.to_bytes(), vec![0, 9]);
//!
//! // A zero status byte is success, anything else is a communication error
//! let ok = ResponseFrame::validate(vec![0, 42]).unwrap();
//! assert_eq!(ok.payload(), &[42]);
//!
//! let err = ResponseFrame::validate(vec![7]).unwrap_err();
//! assert_eq!(err, DeviceError::CommunicationError(7));
//! ```

pub mod error;
pub mod frame;
pub mod types;

pub use error::{DeviceError, Result};
pub use frame::{
    CMD_GET_DEVICE_STATE, REPORT_ID, REPORT_SIZE, RequestFrame, ResponseFrame, STATUS_SUCCESS,
};
pub use types::{DeviceDescriptor, DeviceStateChanged, STATE_CHANGED_EVENT, UsagePair};
