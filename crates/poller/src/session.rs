//! Session wiring
//!
//! A [`Session`] owns everything one run of the poller needs: the device
//! worker thread, the bridge into it, the polling engine and the listener
//! for the start signal. The host creates it once and calls
//! [`Session::close`] on the way out.

use crate::engine::{DEFAULT_POLL_INTERVAL, NotificationSink, PollingEngine};
use crate::hid::{DeviceLocator, DeviceMatcher, HidBackend, TransactionTiming, spawn_device_worker};
use common::{DeviceBridge, create_device_bridge};
use protocol::DeviceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Default upper bound for [`Session::close`] to wait on the engine
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime parameters of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub matcher: DeviceMatcher,
    pub timing: TransactionTiming,
    pub poll_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            matcher: DeviceMatcher::default(),
            timing: TransactionTiming::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// One-shot "begin polling" trigger
///
/// Can be fired before or after the session starts; the signal is buffered
/// until the session picks it up. Dropping it without firing never enables
/// polling.
#[derive(Debug)]
pub struct ControlSignal {
    tx: oneshot::Sender<()>,
}

impl ControlSignal {
    /// Create the signal and the receiver handed to [`Session::start`]
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Fire the signal; false if the session is already gone
    pub fn send(self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// A running poller
pub struct Session {
    engine: Arc<PollingEngine>,
    bridge: DeviceBridge,
    worker: Option<std::thread::JoinHandle<()>>,
    control: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl Session {
    /// Spawn the device worker and the polling engine
    ///
    /// `make_backend` runs on the worker thread. Polling stays disabled until
    /// `start_signal` fires.
    pub fn start<B, F>(
        settings: SessionSettings,
        make_backend: F,
        sink: Arc<dyn NotificationSink>,
        start_signal: oneshot::Receiver<()>,
    ) -> common::Result<Self>
    where
        B: HidBackend,
        F: FnOnce() -> Result<B, DeviceError> + Send + 'static,
    {
        let (bridge, worker) = create_device_bridge();
        let worker = spawn_device_worker(
            worker,
            make_backend,
            DeviceLocator::new(settings.matcher),
            settings.timing,
        )?;

        let engine = Arc::new(PollingEngine::start(
            bridge.clone(),
            sink,
            settings.poll_interval,
        ));

        let listener = engine.clone();
        let control = tokio::spawn(async move {
            match start_signal.await {
                Ok(()) => {
                    debug!("Start signal received");
                    listener.enable();
                }
                Err(_) => debug!("Start signal dropped without firing"),
            }
        });

        info!("Session started");
        Ok(Self {
            engine,
            bridge,
            worker: Some(worker),
            control: Some(control),
            shutdown_timeout: settings.shutdown_timeout,
        })
    }

    pub fn engine(&self) -> &Arc<PollingEngine> {
        &self.engine
    }

    /// Bridge for foreground transactions; shares the worker with the poller
    pub fn bridge(&self) -> DeviceBridge {
        self.bridge.clone()
    }

    /// Shut everything down
    ///
    /// Never fails; problems are logged. If the engine misses the shutdown
    /// timeout its loop is aborted, and joining the device worker still
    /// waits out the transaction it is running.
    pub async fn close(mut self) {
        info!("Closing session");

        if let Some(control) = self.control.take() {
            control.abort();
        }

        match tokio::time::timeout(self.shutdown_timeout, self.engine.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Polling engine shutdown failed: {}", e),
            Err(_) => {
                error!(
                    "Polling engine did not stop within {:?}",
                    self.shutdown_timeout
                );
                self.engine.abort().await;
            }
        }

        if let Err(e) = self.bridge.shutdown().await {
            debug!("Device worker already gone: {}", e);
        }

        if let Some(worker) = self.worker.take() {
            match tokio::task::spawn_blocking(move || worker.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Device worker thread panicked: {:?}", e),
                Err(e) => error!("Failed to join device worker thread: {}", e),
            }
        }

        info!("Session closed");
    }
}
