//! Async channel bridge between the Tokio runtime and the device worker thread
//!
//! The worker thread is the only owner of the HID connection. Everything that
//! wants to talk to the device goes through a [`DeviceBridge`], which queues a
//! [`DeviceCommand`] and awaits the reply. Commands are handled one at a time,
//! so transactions can never overlap no matter how many bridge clones exist.

use async_channel::{Receiver, Sender, bounded};
use protocol::{DeviceDescriptor, DeviceError, RequestFrame, ResponseFrame};
use tokio::sync::oneshot;

/// Commands from the Tokio runtime to the device worker thread
#[derive(Debug)]
pub enum DeviceCommand {
    /// Run one write-then-read transaction
    Transact {
        /// Frame to write
        request: RequestFrame,
        /// Channel to send the validated response back
        response: oneshot::Sender<Result<ResponseFrame, DeviceError>>,
    },

    /// Enumerate every attached HID interface
    ListDevices {
        /// Channel to send the device list back
        response: oneshot::Sender<Result<Vec<DeviceDescriptor>, DeviceError>>,
    },

    /// Close the device handle if one is open
    CloseDevice {
        /// Acknowledged once the handle is gone
        response: oneshot::Sender<()>,
    },

    /// Close the device handle and stop the worker thread
    Shutdown,
}

/// Handle for the Tokio runtime (async)
#[derive(Debug, Clone)]
pub struct DeviceBridge {
    cmd_tx: Sender<DeviceCommand>,
}

impl DeviceBridge {
    /// Send a command to the worker thread
    pub async fn send_command(&self, cmd: DeviceCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Run one transaction on the worker thread and wait for its result
    ///
    /// Transactions submitted from different tasks are queued, never
    /// interleaved.
    pub async fn transact(&self, request: RequestFrame) -> Result<ResponseFrame, DeviceError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(DeviceCommand::Transact {
            request,
            response: tx,
        })
        .await
        .map_err(|e| DeviceError::WorkerUnavailable(e.to_string()))?;

        rx.await
            .map_err(|_| DeviceError::WorkerUnavailable("worker dropped the request".into()))?
    }

    /// Enumerate attached HID interfaces on the worker thread
    pub async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(DeviceCommand::ListDevices { response: tx })
            .await
            .map_err(|e| DeviceError::WorkerUnavailable(e.to_string()))?;

        rx.await
            .map_err(|_| DeviceError::WorkerUnavailable("worker dropped the request".into()))?
    }

    /// Ask the worker to close its device handle
    ///
    /// Closing an already closed handle is a no-op on the worker side.
    pub async fn close_device(&self) -> crate::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_command(DeviceCommand::CloseDevice { response: tx })
            .await?;
        rx.await
            .map_err(|_| crate::Error::Channel("worker dropped the close request".into()))
    }

    /// Ask the worker thread to exit
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.send_command(DeviceCommand::Shutdown).await
    }

    /// Whether the worker side has gone away
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// Handle for the device worker thread (blocking)
pub struct DeviceWorker {
    pub(crate) cmd_rx: Receiver<DeviceCommand>,
}

impl DeviceWorker {
    /// Receive a command from Tokio runtime (blocking)
    ///
    /// Fails once every [`DeviceBridge`] has been dropped.
    pub fn recv_command(&self) -> crate::Result<DeviceCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and the device worker thread
///
/// Returns (DeviceBridge for Tokio, DeviceWorker for the worker thread)
pub fn create_device_bridge() -> (DeviceBridge, DeviceWorker) {
    let (cmd_tx, cmd_rx) = bounded(32);

    (DeviceBridge { cmd_tx }, DeviceWorker { cmd_rx })
}
