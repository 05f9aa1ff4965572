//! Device configuration and data directory paths.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::get_data_dir;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "UMI_CONFIG";

/// device_config.json shape. Every field falls back to its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub bridge_host: String,
    pub bridge_port: u16,
    pub bridge_path: String,
    pub reconnect_interval_ms: u64,
    /// Fixed device identity. Derived from the host when absent.
    pub device_id: Option<String>,
    pub sample_rate: u32,
    /// Audio frame duration.
    pub frame_ms: u32,
    pub mic_gain: i32,
    pub capture_timeout_ms: u64,
    pub debounce_ms: u64,
    pub long_press_ms: u64,
    pub idle_delay_ms: u64,
    /// Key standing in for the hardware button (e.g. "space", "F5").
    pub button_key: String,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub network_attempts: u32,
    pub network_retry_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            bridge_host: "192.168.1.100".to_string(),
            bridge_port: 8765,
            bridge_path: "/".to_string(),
            reconnect_interval_ms: 5_000,
            device_id: None,
            sample_rate: 16_000,
            frame_ms: 30,
            mic_gain: 3,
            capture_timeout_ms: 10,
            debounce_ms: 50,
            long_press_ms: 3_000,
            idle_delay_ms: 10,
            button_key: "space".to_string(),
            input_device: None,
            output_device: None,
            network_attempts: 30,
            network_retry_ms: 500,
        }
    }
}

impl DeviceConfig {
    /// WebSocket URL of the bridge.
    pub fn bridge_url(&self) -> String {
        let path = if self.bridge_path.starts_with('/') {
            self.bridge_path.clone()
        } else {
            format!("/{}", self.bridge_path)
        };
        format!("ws://{}:{}{}", self.bridge_host, self.bridge_port, path)
    }

    /// Samples per audio frame (480 at 16 kHz / 30 ms).
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize / 1000).max(1)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Read the device config, falling back to defaults.
pub fn read_device_config() -> DeviceConfig {
    let path = get_config_path();
    read_json_file(&path).unwrap_or_default()
}

/// Path to device_config.json (or `$UMI_CONFIG`).
pub fn get_config_path() -> PathBuf {
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(p) => PathBuf::from(p),
        None => get_data_dir().join("device_config.json"),
    }
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
