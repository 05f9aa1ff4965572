//! Umi - push-to-talk voice assistant device core.
//!
//! Streams microphone audio to a bridge service over a WebSocket while a
//! session is open and plays the agent's reply back through the same audio
//! bus. A single button starts and ends sessions; holding it puts the
//! device to sleep.

mod audio;
mod bridge;
mod config;
mod control;
mod input;
mod logger;
mod platform;
mod session;

#[cfg(test)]
mod testing;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, error, info};

use audio::{AudioPipeline, HostAudioBus, PipelineSettings};
use bridge::link::{self, LinkConfig};
use config::paths::get_log_dir;
use config::{get_config_path, read_device_config, DeviceConfig};
use control::ControlLoop;
use input::hotkey::KeyButton;
use input::{InputController, InputSettings};
use platform::{derive_device_id, wait_for_network, HostPower, Indicator, LogIndicator, SystemClock};
use session::{DeviceInfo, SessionMachine};

/// Channels on the wire; capture is mono.
const WIRE_CHANNELS: u16 = 1;

/// Logging comes first so problems with the config file are recorded.
fn init_logging_and_config(log_dir: &Path) -> anyhow::Result<DeviceConfig> {
    logger::init(log_dir)?;
    Ok(read_device_config())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = init_logging_and_config(&get_log_dir())?;

    info!("========================================");
    info!("Umi device core v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!(config = %get_config_path().display(), ?cfg, "Configuration loaded");
    debug!(devices = ?audio::host::list_devices(), "Input devices");

    // On until the bridge accepts us.
    let mut indicator = LogIndicator::default();
    indicator.set(true);

    if !wait_for_network(
        &cfg.bridge_host,
        cfg.bridge_port,
        cfg.network_attempts,
        Duration::from_millis(cfg.network_retry_ms),
    )
    .await
    {
        error!(host = %cfg.bridge_host, "Network unavailable, halting");
        std::future::pending::<()>().await;
    }

    let device_info = DeviceInfo {
        device_id: cfg.device_id.clone().unwrap_or_else(derive_device_id),
        sample_rate: cfg.sample_rate,
        channels: WIRE_CHANNELS,
    };
    info!(device_id = %device_info.device_id, url = %cfg.bridge_url(), "Device identity");

    let (handle, events) = link::spawn(LinkConfig::from(&cfg));
    let button = KeyButton::start(&cfg.button_key)?;

    // The audio streams are not Send, so the bus is built on the control thread.
    let control = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let bus = HostAudioBus::new(
            cfg.sample_rate,
            cfg.input_device.clone(),
            cfg.output_device.clone(),
        );
        let pipeline = AudioPipeline::new(bus, PipelineSettings::from(&cfg));
        let mut machine = SessionMachine::new(pipeline, handle, indicator, device_info);
        machine.boot().context("Failed to open audio bus in capture mode")?;

        ControlLoop::new(
            machine,
            InputController::new(button, InputSettings::from(&cfg)),
            events,
            SystemClock::new(),
            HostPower,
            Duration::from_millis(cfg.idle_delay_ms),
        )
        .run();
        Ok(())
    });

    control.await.context("Control loop panicked")??;
    info!("Device halted, exiting");
    Ok(())
}
