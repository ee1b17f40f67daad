//! Polling engine integration tests
//!
//! Runs the real device worker thread and polling loop on top of the
//! in-memory HID backend.
//!
//! # Test Scenarios
//! - Idle engine never touches the device
//! - Enable, notify per successful poll, shut down, silence afterwards
//! - disable() and shutdown() wait for the in-flight poll
//! - A cancelled shutdown() can be retried
//! - Foreground transactions never overlap background polls
//! - Session start signal handling and bounded close
//!
//! Run with: `cargo test -p poller --test engine_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, with_timeout};
use common::{DeviceBridge, create_device_bridge};
use poller::engine::{ChannelSink, EngineState, NotificationSink, PollingEngine};
use poller::hid::{DeviceLocator, TransactionTiming, spawn_device_worker};
use poller::session::{ControlSignal, Session, SessionSettings};
use poller::testing::{MockBackend, MockResponse};
use protocol::{DeviceStateChanged, RequestFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Harness {
    backend: MockBackend,
    bridge: DeviceBridge,
    worker: JoinHandle<()>,
    engine: PollingEngine,
}

impl Harness {
    fn start(backend: MockBackend, sink: Arc<dyn NotificationSink>) -> Self {
        let (bridge, worker) = create_device_bridge();
        let thread_backend = backend.clone();
        let worker = spawn_device_worker(
            worker,
            move || Ok(thread_backend),
            DeviceLocator::default(),
            TransactionTiming::default(),
        )
        .unwrap();
        let engine = PollingEngine::start(bridge.clone(), sink, POLL_INTERVAL);

        Self {
            backend,
            bridge,
            worker,
            engine,
        }
    }

    fn with_channel(backend: MockBackend) -> (Self, mpsc::Receiver<DeviceStateChanged>) {
        let (sink, rx) = ChannelSink::channel(256);
        (Self::start(backend, Arc::new(sink)), rx)
    }

    async fn finish(self) {
        self.engine.shutdown().await.unwrap();
        self.bridge.shutdown().await.unwrap();
        tokio::task::spawn_blocking(move || self.worker.join())
            .await
            .unwrap()
            .unwrap();
    }
}

/// Sink that records events and can be switched off
#[derive(Default)]
struct RecordingSink {
    unavailable: AtomicBool,
    events: Mutex<Vec<DeviceStateChanged>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl NotificationSink for RecordingSink {
    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    fn deliver(&self, event: DeviceStateChanged) {
        self.events.lock().unwrap().push(event);
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    with_timeout(DEFAULT_TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_engine_is_silent() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0, 1]));
    let (harness, mut rx) = Harness::with_channel(backend);

    tokio::time::sleep(POLL_INTERVAL * 10).await;

    assert_eq!(harness.engine.state(), EngineState::Idle);
    assert!(harness.backend.writes().is_empty());
    assert_eq!(harness.backend.enumerations(), 0);
    assert!(rx.try_recv().is_err());

    harness.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_to_end_polling() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0, 0x11, 0x22]));
    let (harness, mut rx) = Harness::with_channel(backend.clone());

    harness.engine.enable();

    for expected in 0..3u64 {
        let event = with_timeout(DEFAULT_TEST_TIMEOUT, rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.sequence, expected);
        assert_eq!(event.status, 0);
        assert_eq!(event.payload, vec![0x11, 0x22]);
    }

    harness.engine.shutdown().await.unwrap();
    assert_eq!(harness.engine.state(), EngineState::Stopped);
    assert_eq!(backend.open_connections(), 0);

    // Whatever was queued before shutdown returned, then the sink is gone
    while rx.try_recv().is_ok() {}
    let writes = backend.writes().len();
    tokio::time::sleep(POLL_INTERVAL * 5).await;
    assert_eq!(backend.writes().len(), writes);
    assert!(
        with_timeout(DEFAULT_TEST_TIMEOUT, rx.recv())
            .await
            .unwrap()
            .is_none()
    );

    harness.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_twice_is_noop() {
    let (harness, _rx) = Harness::with_channel(MockBackend::with_target_device());

    harness.engine.shutdown().await.unwrap();
    harness.engine.shutdown().await.unwrap();
    assert_eq!(harness.engine.state(), EngineState::Stopped);

    harness.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_enable_after_shutdown_is_ignored() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0]));
    let (harness, _rx) = Harness::with_channel(backend.clone());

    harness.engine.shutdown().await.unwrap();
    harness.engine.enable();
    harness.engine.disable().await;

    tokio::time::sleep(POLL_INTERVAL * 5).await;
    assert_eq!(harness.engine.state(), EngineState::Stopped);
    assert!(backend.writes().is_empty());

    harness.finish().await;
}

// ============================================================================
// Quiesce Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disable_waits_for_in_flight_poll() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0]));
    backend.set_read_delay(Duration::from_millis(150));
    let (harness, _rx) = Harness::with_channel(backend.clone());

    harness.engine.enable();
    wait_until(|| backend.is_in_flight()).await;

    let started = Instant::now();
    harness.engine.disable().await;

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(!backend.is_in_flight());
    assert!(!harness.engine.state().is_active());
    assert_eq!(harness.engine.state(), EngineState::Idle);

    // No new polls start while disabled
    let writes = backend.writes().len();
    tokio::time::sleep(POLL_INTERVAL * 10).await;
    assert_eq!(backend.writes().len(), writes);

    harness.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disable_when_idle_returns_immediately() {
    let (harness, _rx) = Harness::with_channel(MockBackend::with_target_device());

    with_timeout(Duration::from_millis(100), harness.engine.disable())
        .await
        .expect("disable blocked without a poll in flight");

    harness.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reenable_during_drain_resumes_polling() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0]));
    backend.set_read_delay(Duration::from_millis(50));
    let (harness, mut rx) = Harness::with_channel(backend.clone());

    harness.engine.enable();
    wait_until(|| backend.is_in_flight()).await;

    {
        let engine = &harness.engine;
        let disable = engine.disable();
        tokio::pin!(disable);
        // Let disable() register before re-enabling
        assert!(
            tokio::time::timeout(Duration::from_millis(5), &mut disable)
                .await
                .is_err()
        );
        assert_eq!(engine.state(), EngineState::Draining);

        engine.enable();
        assert_eq!(engine.state(), EngineState::Polling);
        with_timeout(DEFAULT_TEST_TIMEOUT, &mut disable)
            .await
            .unwrap();

        // Still allowed, so events keep coming
        assert!(engine.state().is_allowed());
        let first = with_timeout(DEFAULT_TEST_TIMEOUT, rx.recv()).await.unwrap();
        assert!(first.is_some());
    }

    harness.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_in_flight_poll() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0, 1]));
    backend.set_read_delay(Duration::from_millis(100));
    let sink = Arc::new(RecordingSink::default());
    let harness = Harness::start(backend.clone(), sink.clone());

    harness.engine.enable();
    wait_until(|| backend.is_in_flight()).await;

    harness.engine.shutdown().await.unwrap();
    assert!(!backend.is_in_flight());
    assert_eq!(harness.engine.state(), EngineState::Stopped);
    assert_eq!(backend.open_connections(), 0);

    let delivered = sink.count();
    tokio::time::sleep(POLL_INTERVAL * 5).await;
    assert_eq!(sink.count(), delivered);

    harness.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_shutdown_can_be_retried() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0, 1]));
    backend.set_read_delay(Duration::from_millis(400));
    let (harness, _rx) = Harness::with_channel(backend.clone());

    harness.engine.enable();
    wait_until(|| backend.is_in_flight()).await;

    let first = tokio::time::timeout(Duration::from_millis(20), harness.engine.shutdown()).await;
    assert!(first.is_err());
    assert!(backend.is_in_flight());

    // The loop is still tracked, so this waits for the poll to finish
    harness.engine.shutdown().await.unwrap();
    assert!(!backend.is_in_flight());
    assert_eq!(harness.engine.state(), EngineState::Stopped);
    assert_eq!(backend.open_connections(), 0);

    harness.finish().await;
}

// ============================================================================
// Failure and Delivery Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_poll_failures_do_not_stop_the_loop() {
    let backend = MockBackend::with_target_device();
    backend.push_response(MockResponse::Timeout);
    backend.push_frame(vec![3, 0]);
    backend.push_response(MockResponse::ReadError("EIO".into()));
    backend.set_default_frame(Some(vec![0, 9]));
    let (harness, mut rx) = Harness::with_channel(backend.clone());

    harness.engine.enable();

    let event = with_timeout(DEFAULT_TEST_TIMEOUT, rx.recv())
        .await
        .unwrap()
        .unwrap();
    // Failed polls do not consume sequence numbers
    assert_eq!(event.sequence, 0);
    assert_eq!(event.payload, vec![9]);
    // One open per failure plus the one that finally worked
    assert_eq!(backend.opens(), 4);

    harness.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unavailable_sink_is_skipped() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0]));
    let sink = Arc::new(RecordingSink::default());
    sink.unavailable.store(true, Ordering::SeqCst);
    let harness = Harness::start(backend.clone(), sink.clone());

    harness.engine.enable();
    wait_until(|| backend.writes().len() >= 3).await;
    assert_eq!(sink.count(), 0);

    sink.unavailable.store(false, Ordering::SeqCst);
    wait_until(|| sink.count() >= 1).await;

    harness.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_foreground_transactions_never_overlap_polls() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0, 1]));
    backend.set_read_delay(Duration::from_millis(2));
    let (harness, _rx) = Harness::with_channel(backend.clone());

    harness.engine.enable();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let bridge = harness.bridge.clone();
        tasks.push(tokio::spawn(async move {
            bridge.transact(RequestFrame::query_device_state()).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    assert_eq!(backend.max_in_flight(), 1);
    assert_eq!(backend.opens(), 1);

    harness.finish().await;
}

// ============================================================================
// Session Tests
// ============================================================================

fn session_settings() -> SessionSettings {
    SessionSettings {
        poll_interval: POLL_INTERVAL,
        ..SessionSettings::default()
    }
}

fn start_session(backend: &MockBackend, start_rx: tokio::sync::oneshot::Receiver<()>) -> Session {
    start_session_with(session_settings(), backend, start_rx)
}

fn start_session_with(
    settings: SessionSettings,
    backend: &MockBackend,
    start_rx: tokio::sync::oneshot::Receiver<()>,
) -> Session {
    let thread_backend = backend.clone();
    let (sink, _rx) = ChannelSink::channel(16);
    Session::start(
        settings,
        move || Ok(thread_backend),
        Arc::new(sink),
        start_rx,
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_control_signal_enables_polling() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0]));
    let (signal, start_rx) = ControlSignal::channel();
    let session = start_session(&backend, start_rx);

    assert_eq!(session.engine().state(), EngineState::Idle);
    assert!(signal.send());

    let mut state = session.engine().subscribe();
    with_timeout(DEFAULT_TEST_TIMEOUT, state.wait_for(|s| s.is_allowed()))
        .await
        .unwrap()
        .unwrap();
    wait_until(|| !backend.writes().is_empty()).await;

    session.close().await;
    assert_eq!(backend.open_connections(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_signal_sent_before_start_is_buffered() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0]));
    let (signal, start_rx) = ControlSignal::channel();
    assert!(signal.send());

    let session = start_session(&backend, start_rx);
    wait_until(|| !backend.writes().is_empty()).await;

    session.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_signal_never_enables() {
    let backend = MockBackend::with_target_device();
    let (signal, start_rx) = ControlSignal::channel();
    let session = start_session(&backend, start_rx);
    drop(signal);

    tokio::time::sleep(POLL_INTERVAL * 10).await;
    assert_eq!(session.engine().state(), EngineState::Idle);
    assert!(backend.writes().is_empty());

    session.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_close_stops_everything() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0]));
    let (signal, start_rx) = ControlSignal::channel();
    let session = start_session(&backend, start_rx);
    let engine = session.engine().clone();
    let bridge = session.bridge();
    signal.send();
    wait_until(|| backend.opens() == 1).await;

    session.close().await;

    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(backend.open_connections(), 0);
    // Worker thread is gone
    assert!(
        bridge
            .transact(RequestFrame::query_device_state())
            .await
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_close_after_shutdown_timeout() {
    let backend = MockBackend::with_target_device();
    backend.set_default_frame(Some(vec![0]));
    backend.set_read_delay(Duration::from_millis(300));
    let settings = SessionSettings {
        shutdown_timeout: Duration::from_millis(20),
        ..session_settings()
    };
    let (signal, start_rx) = ControlSignal::channel();
    let session = start_session_with(settings, &backend, start_rx);
    let engine = session.engine().clone();
    let bridge = session.bridge();
    signal.send();
    wait_until(|| backend.is_in_flight()).await;

    with_timeout(DEFAULT_TEST_TIMEOUT, session.close())
        .await
        .unwrap();

    // Joining the worker drained the read that outlived the timeout
    assert!(!backend.is_in_flight());
    assert_eq!(backend.open_connections(), 0);
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(bridge.is_closed());

    // Nothing left running, so a late shutdown has nothing to wait for
    engine.shutdown().await.unwrap();
    assert!(!backend.is_in_flight());
}
