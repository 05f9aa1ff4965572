//! Platform abstraction layer.
//!
//! The core only talks to peripherals through these traits. The host
//! implementations here stand in for the board: a log line for the
//! indicator, a logged halt for deep sleep, and DNS resolution of the
//! bridge for network association.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Raw level of a digital input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

/// A single digital input (active-low, pulled up).
pub trait ButtonPin {
    fn read(&mut self) -> Level;
}

/// Binary indicator output.
pub trait Indicator {
    fn set(&mut self, on: bool);
}

/// Entry into the low-power halt. Terminal for the running process.
pub trait PowerControl {
    fn enter_low_power(&mut self);
}

/// Monotonic milliseconds plus a blocking delay.
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn sleep(&self, duration: Duration);
}

/// Wall clock anchored at construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Indicator that reports changes through the log.
#[derive(Debug, Default)]
pub struct LogIndicator {
    on: Option<bool>,
}

impl Indicator for LogIndicator {
    fn set(&mut self, on: bool) {
        if self.on != Some(on) {
            info!(on, "Indicator");
            self.on = Some(on);
        }
    }
}

/// Host stand-in for deep sleep.
#[derive(Debug, Default)]
pub struct HostPower;

impl PowerControl for HostPower {
    fn enter_low_power(&mut self) {
        info!("Entering low-power halt");
    }
}

/// Wait until the bridge host resolves, retrying at a fixed interval.
///
/// Returns `false` when every attempt failed.
pub async fn wait_for_network(host: &str, port: u16, attempts: u32, retry: Duration) -> bool {
    for attempt in 1..=attempts.max(1) {
        match tokio::net::lookup_host((host, port)).await {
            Ok(mut addrs) => {
                if let Some(addr) = addrs.next() {
                    info!(%addr, attempt, "Network available");
                    return true;
                }
            }
            Err(e) => {
                warn!(attempt, "Bridge host not resolvable yet: {}", e);
            }
        }
        tokio::time::sleep(retry).await;
    }
    false
}

/// Stable device identity: `umi-` plus 8 hex digits.
///
/// Hashes the host machine id when one is readable, otherwise uses a
/// random UUID (identity then changes per run).
pub fn derive_device_id() -> String {
    let seed = ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    device_id_from_seed(&seed)
}

fn device_id_from_seed(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    format!("umi-{}", hex::encode(&digest[..4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_is_stable_and_short() {
        let a = device_id_from_seed("abc");
        let b = device_id_from_seed("abc");
        assert_eq!(a, b);
        assert!(a.starts_with("umi-"));
        assert_eq!(a.len(), "umi-".len() + 8);
        assert_ne!(a, device_id_from_seed("abd"));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let t0 = clock.now_ms();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now_ms() >= t0 + 1);
    }

    #[tokio::test]
    async fn test_localhost_counts_as_network() {
        assert!(wait_for_network("127.0.0.1", 8765, 1, Duration::from_millis(1)).await);
    }
}
