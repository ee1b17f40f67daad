//! hid-poller
//!
//! Polls a USB HID peripheral for its state and prints every change.

use anyhow::{Context, Result};
use clap::Parser;
use common::{create_device_bridge, setup_logging};
use poller::config::PollerConfig;
use poller::hid::{DeviceLocator, HidApiBackend, spawn_device_worker};
use poller::{ChannelSink, ControlSignal, EngineState, Session, service};
use protocol::{DeviceStateChanged, RequestFrame, STATE_CHANGED_EVENT};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Queue depth between the engine and the console consumer
const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "hid-poller")]
#[command(author, version, about = "Poll a USB HID device and report its state")]
#[command(long_about = "
Keeps a connection to a USB HID peripheral, queries its state every poll
interval and prints each reply as a JSON event.

EXAMPLES:
    # Run with default config
    hid-poller

    # List HID interfaces and show which one would be used
    hid-poller --list-devices

    # Query the device once and exit
    hid-poller --once

    # Run as systemd service
    hid-poller --service

CONFIGURATION:
    The poller looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/hid-poller/poller.toml
    3. /etc/hid-poller/poller.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration and exit
    #[arg(long)]
    save_config: bool,

    /// Run as systemd service (no console output)
    #[arg(long)]
    service: bool,

    /// List HID interfaces and exit
    #[arg(long)]
    list_devices: bool,

    /// Send one state query, print the reply and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = PollerConfig::default();
        let path = args.config.clone().unwrap_or_else(PollerConfig::default_path);
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        PollerConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        PollerConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.poller.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("hid-poller v{}", env!("CARGO_PKG_VERSION"));
    debug!("Log level: {}", log_level);

    if args.list_devices {
        return list_devices_mode(&config).await;
    }

    if args.once {
        return once_mode(&config).await;
    }

    let service_mode = args.service || config.poller.service_mode;
    run(config, service_mode).await
}

/// Enumerate HID interfaces and mark the one the poller would open
async fn list_devices_mode(config: &PollerConfig) -> Result<()> {
    let locator = DeviceLocator::new(config.device.matcher());
    let settings = config.session_settings();

    let (bridge, worker) = create_device_bridge();
    let worker = spawn_device_worker(
        worker,
        HidApiBackend::new,
        locator.clone(),
        settings.timing,
    )
    .context("Failed to spawn device worker")?;

    let result = bridge.list_devices().await;

    if let Err(e) = bridge.shutdown().await {
        debug!("Device worker already gone: {}", e);
    }
    if !matches!(
        tokio::task::spawn_blocking(move || worker.join()).await,
        Ok(Ok(()))
    ) {
        error!("Device worker thread panicked");
    }

    let devices = result.context("Failed to enumerate HID devices")?;
    if devices.is_empty() {
        println!("No HID devices found.");
        return Ok(());
    }

    let selected = locator.select(&devices).map(|d| d.path.clone());
    println!("Found {} HID interface(s):\n", devices.len());
    for device in &devices {
        let marker = if selected.as_deref() == Some(device.path.as_str()) {
            "*"
        } else if locator.matcher().matches(device) {
            "+"
        } else {
            " "
        };
        println!(
            "{} {:04x}:{:04x}  usage {}  {}",
            marker,
            device.vendor_id,
            device.product_id,
            device.usage_pair(),
            device.product.as_deref().unwrap_or("Unknown Product")
        );
        println!("      {}", device.path);
    }
    println!("\n* = would be opened, + = also accepted");

    Ok(())
}

/// One foreground transaction through the session bridge
async fn once_mode(config: &PollerConfig) -> Result<()> {
    let (sink, _rx) = ChannelSink::channel(1);
    // Never fired: polling stays disabled
    let (_signal, start_rx) = ControlSignal::channel();

    let session = Session::start(
        config.session_settings(),
        HidApiBackend::new,
        Arc::new(sink),
        start_rx,
    )
    .context("Failed to start session")?;

    let result = session
        .bridge()
        .transact(RequestFrame::query_device_state())
        .await;
    session.close().await;

    let response = result.context("Device query failed")?;
    let event = DeviceStateChanged {
        sequence: 0,
        status: response.status(),
        payload: response.payload().to_vec(),
    };
    println!("{}", event.to_json().context("Failed to encode event")?);
    Ok(())
}

/// Poll until Ctrl+C
async fn run(config: PollerConfig, service_mode: bool) -> Result<()> {
    let (sink, rx) = ChannelSink::channel(NOTIFICATION_CAPACITY);
    let (start_signal, start_rx) = ControlSignal::channel();

    let session = Session::start(
        config.session_settings(),
        HidApiBackend::new,
        Arc::new(sink),
        start_rx,
    )
    .context("Failed to start session")?;

    let consumer = tokio::spawn(consume_notifications(rx, service_mode));
    let status = tokio::spawn(report_state(session.engine().subscribe()));

    // The consumer is listening, so polling can begin
    if config.poller.auto_start {
        start_signal.send();
    } else {
        tokio::spawn(relay_start_signal(start_signal));
    }

    if service::is_systemd() {
        info!("Running under systemd");
    }
    service::notify_ready().context("Failed to notify systemd ready")?;

    info!("Press Ctrl+C to shutdown");
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    if let Err(e) = service::notify_stopping() {
        warn!("{:#}", e);
    }

    session.close().await;
    status.abort();
    consumer.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Print every state event
async fn consume_notifications(mut rx: mpsc::Receiver<DeviceStateChanged>, quiet: bool) {
    while let Some(event) = rx.recv().await {
        match event.to_json() {
            Ok(json) if !quiet => println!("{} {}", STATE_CHANGED_EVENT, json),
            Ok(json) => debug!("{} {}", STATE_CHANGED_EVENT, json),
            Err(e) => warn!("Failed to encode event {}: {}", event.sequence, e),
        }
    }
}

/// Mirror engine state into the systemd status line
async fn report_state(mut rx: watch::Receiver<EngineState>) {
    while rx.changed().await.is_ok() {
        let state = *rx.borrow_and_update();
        if matches!(state, EngineState::Ready | EngineState::Idle | EngineState::Stopped)
            && let Err(e) = service::notify_status(&format!("Engine {}", state))
        {
            debug!("{:#}", e);
        }
    }
}

/// Fire the start signal on SIGUSR1
async fn relay_start_signal(start_signal: ControlSignal) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to listen for SIGUSR1: {}", e);
            return;
        }
    };

    info!("Waiting for SIGUSR1 to begin polling");
    if usr1.recv().await.is_some() {
        start_signal.send();
    }
}

