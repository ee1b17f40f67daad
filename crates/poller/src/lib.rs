//! hid-poller
//!
//! Keeps one exclusive connection to a USB HID peripheral, polls its state
//! on a fixed cadence and forwards every successful reply to a notification
//! consumer.
//!
//! - [`hid`]: discovery, the device handle and write-then-read transactions,
//!   all running on a dedicated worker thread
//! - [`engine`]: the background polling loop and its state machine
//! - [`session`]: wires worker, engine and the start signal together
//! - [`config`]: TOML configuration
//! - [`testing`]: in-memory HID backend for tests

pub mod config;
pub mod engine;
pub mod hid;
pub mod service;
pub mod session;
pub mod testing;

pub use config::PollerConfig;
pub use engine::{ChannelSink, EngineError, EngineState, NotificationSink, PollingEngine};
pub use session::{ControlSignal, Session, SessionSettings};
