//! Device worker thread
//!
//! Dedicated OS thread that owns the [`TransactionChannel`] and with it the
//! device handle. Commands arrive from the Tokio runtime over the
//! [`DeviceWorker`] end of the bridge and are executed strictly one after
//! another, so the foreground path and the background poller can never
//! interleave a write with someone else's read.

use super::backend::HidBackend;
use super::locator::DeviceLocator;
use super::transaction::{TransactionChannel, TransactionTiming};
use common::{DeviceCommand, DeviceWorker};
use protocol::DeviceError;
use tracing::{debug, error, info, warn};

/// Device worker thread
pub struct DeviceWorkerThread<B: HidBackend> {
    /// Transaction channel (sole owner of the device handle)
    channel: TransactionChannel<B>,
    /// Communication channel with Tokio runtime
    worker: DeviceWorker,
}

impl<B: HidBackend> DeviceWorkerThread<B> {
    pub fn new(worker: DeviceWorker, channel: TransactionChannel<B>) -> Self {
        Self { channel, worker }
    }

    /// Run the command loop
    ///
    /// Returns on a Shutdown command or once every bridge has been dropped.
    /// The device handle is closed either way.
    pub fn run(mut self) {
        info!("Device worker thread started");

        loop {
            match self.worker.recv_command() {
                Ok(DeviceCommand::Shutdown) => {
                    info!("Device worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(_) => {
                    debug!("All device bridges dropped");
                    break;
                }
            }
        }

        self.channel.close();
        info!("Device worker thread stopped");
    }

    /// Handle a command from the Tokio runtime
    fn handle_command(&mut self, cmd: DeviceCommand) {
        // Wrap in catch_unwind to prevent panics from crashing the device thread
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in device command handler: {:?}", e);
            // Whatever state the handle was left in is not trusted
            self.channel.close();
        }
    }

    fn handle_command_inner(&mut self, cmd: DeviceCommand) {
        match cmd {
            DeviceCommand::Transact { request, response } => {
                debug!("Transaction: command {:#04x}", request.command_id());
                let result = self.channel.transact(&request);
                let _ = response.send(result);
            }

            DeviceCommand::ListDevices { response } => {
                let result = self.channel.list_devices();
                if let Ok(devices) = &result {
                    debug!("Listing {} HID interfaces", devices.len());
                }
                let _ = response.send(result);
            }

            DeviceCommand::CloseDevice { response } => {
                self.channel.close();
                let _ = response.send(());
            }

            DeviceCommand::Shutdown => {
                // Handled in run()
            }
        }
    }
}

/// Answer every command with `error` until shut down
///
/// Used when the HID backend could not be created, so callers get a device
/// error instead of a dead channel.
fn serve_unavailable(worker: DeviceWorker, error: DeviceError) {
    while let Ok(cmd) = worker.recv_command() {
        match cmd {
            DeviceCommand::Transact { response, .. } => {
                let _ = response.send(Err(error.clone()));
            }
            DeviceCommand::ListDevices { response } => {
                let _ = response.send(Err(error.clone()));
            }
            DeviceCommand::CloseDevice { response } => {
                let _ = response.send(());
            }
            DeviceCommand::Shutdown => break,
        }
    }
}

/// Spawn the device worker thread
///
/// The backend is built on the worker thread itself, so it never has to
/// cross threads.
pub fn spawn_device_worker<B, F>(
    worker: DeviceWorker,
    make_backend: F,
    locator: DeviceLocator,
    timing: TransactionTiming,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    B: HidBackend,
    F: FnOnce() -> Result<B, DeviceError> + Send + 'static,
{
    std::thread::Builder::new()
        .name("device-worker".to_string())
        .spawn(move || match make_backend() {
            Ok(backend) => {
                let channel = TransactionChannel::new(backend, locator, timing);
                DeviceWorkerThread::new(worker, channel).run();
            }
            Err(e) => {
                warn!("HID backend unavailable: {}", e);
                serve_unavailable(worker, e);
            }
        })
}
