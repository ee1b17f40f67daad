//! Background polling engine
//!
//! One Tokio task wakes up every poll interval. While polling is allowed it
//! sends the state query through the [`DeviceBridge`] and forwards every
//! successful response to the [`NotificationSink`]. Failures are logged and
//! the next tick simply tries again; the transaction channel has already
//! dropped the broken handle by then.
//!
//! All lifecycle flags live in a single [`EngineState`] behind a
//! `tokio::sync::watch` channel. Transitions are applied atomically, and
//! callers that need to wait for the loop to quiesce wait on the channel
//! instead of polling a flag.

pub mod sink;
pub mod state;

pub use sink::{ChannelSink, NotificationSink};
pub use state::{EngineState, Transition};

use common::DeviceBridge;
use protocol::{DeviceStateChanged, RequestFrame};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Default time between loop iterations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Polling loop failed: {0}")]
    Loop(#[from] tokio::task::JoinError),

    #[error("Failed to close device: {0}")]
    Close(#[from] common::Error),
}

/// Handle to a running polling loop
///
/// Created with polling disallowed; call [`PollingEngine::enable`] to start
/// talking to the device.
pub struct PollingEngine {
    state: Arc<watch::Sender<EngineState>>,
    bridge: DeviceBridge,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingEngine {
    /// Spawn the polling loop on the current Tokio runtime
    pub fn start(
        bridge: DeviceBridge,
        sink: Arc<dyn NotificationSink>,
        poll_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);
        let state = Arc::new(state);

        let task = tokio::spawn(run_loop(
            state.clone(),
            bridge.clone(),
            sink,
            poll_interval,
        ));
        debug!("Polling engine started, interval {:?}", poll_interval);

        Self {
            state,
            bridge,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Allow polling; ignored once shutdown has begun
    pub fn enable(&self) {
        if apply(&self.state, Transition::Enable).is_some() {
            info!("Polling enabled");
        }
    }

    /// Disallow polling and wait until no poll is in flight
    pub async fn disable(&self) {
        if apply(&self.state, Transition::Disable).is_some() {
            info!("Polling disabled");
        }

        let mut rx = self.state.subscribe();
        // The sender lives in self, so this only returns once quiesced
        let _ = rx.wait_for(|state| !state.is_active()).await;
    }

    /// Stop the loop for good and close the device
    ///
    /// Waits for an in-flight poll to finish and for the loop task to exit.
    /// Calling it again after it returned is a no-op. If the future is
    /// dropped before the join completes, the loop task stays tracked and the
    /// next call waits for it again.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let mut task = self.task.lock().await;
        let Some(handle) = task.as_mut() else {
            debug!("Polling engine already shut down");
            return Ok(());
        };

        info!("Shutting down polling engine");
        apply(&self.state, Transition::Shutdown);

        let joined = handle.await;
        // Only forget the task once it has actually finished
        *task = None;
        if joined.is_err() {
            // The loop can no longer finish its iteration
            self.state.send_replace(EngineState::Stopped);
        }
        let closed = self.bridge.close_device().await;

        joined?;
        closed?;
        info!("Polling engine stopped");
        Ok(())
    }

    /// Cancel the loop task without waiting for its iteration
    ///
    /// A transaction already handed to the device worker still runs to
    /// completion there; the caller has to drain the worker before assuming
    /// the device is idle.
    pub(crate) async fn abort(&self) {
        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            return;
        };

        warn!("Aborting polling loop");
        apply(&self.state, Transition::Shutdown);
        handle.abort();
        if let Err(e) = handle.await
            && !e.is_cancelled()
        {
            warn!("Polling loop failed before abort: {}", e);
        }
        self.state.send_replace(EngineState::Stopped);
    }
}

impl Drop for PollingEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            debug!("Polling engine dropped without shutdown, aborting loop");
            handle.abort();
        }
    }
}

/// Apply `transition`, returning the new state if it changed
fn apply(state: &watch::Sender<EngineState>, transition: Transition) -> Option<EngineState> {
    let mut changed = None;
    state.send_if_modified(|current| {
        let next = current.apply(transition);
        if next == *current {
            return false;
        }
        trace!("Engine state {} -> {} ({:?})", current, next, transition);
        *current = next;
        changed = Some(next);
        true
    });
    changed
}

async fn run_loop(
    state: Arc<watch::Sender<EngineState>>,
    bridge: DeviceBridge,
    sink: Arc<dyn NotificationSink>,
    poll_interval: Duration,
) {
    let mut rx = state.subscribe();
    let query = RequestFrame::query_device_state();
    let mut sequence = 0u64;

    loop {
        if state.borrow().is_shutting_down() {
            break;
        }

        if apply(&state, Transition::BeginIteration) == Some(EngineState::Polling) {
            match bridge.transact(query.clone()).await {
                Ok(response) => {
                    let event = DeviceStateChanged {
                        sequence,
                        status: response.status(),
                        payload: response.payload().to_vec(),
                    };
                    sequence += 1;

                    if state.borrow().is_shutting_down() {
                        trace!("Shutting down, discarding event {}", event.sequence);
                    } else if sink.is_available() {
                        sink.deliver(event);
                    } else {
                        trace!("No notification consumer, skipping event {}", event.sequence);
                    }
                }
                Err(e) => warn!("Poll failed: {}", e),
            }

            apply(&state, Transition::EndIteration);
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = rx.wait_for(|s| s.is_shutting_down()) => {}
        }
    }

    debug!("Polling loop exited");
}
