//! Notification delivery
//!
//! The engine hands every successful poll to a [`NotificationSink`]. Delivery
//! is fire-and-forget: a sink that has gone away or cannot keep up loses
//! events, and the engine never waits on it.

use protocol::DeviceStateChanged;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

/// Consumer of device state notifications
pub trait NotificationSink: Send + Sync {
    /// Whether anyone is listening right now
    fn is_available(&self) -> bool;

    /// Hand over one event; must not block
    fn deliver(&self, event: DeviceStateChanged);
}

/// Sink backed by a bounded Tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<DeviceStateChanged>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<DeviceStateChanged>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DeviceStateChanged>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl NotificationSink for ChannelSink {
    fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }

    fn deliver(&self, event: DeviceStateChanged) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Notification consumer lagging, dropped event {}", event.sequence);
            }
            Err(TrySendError::Closed(event)) => {
                trace!("Notification consumer gone, dropped event {}", event.sequence);
            }
        }
    }
}
