//! The shared audio bus: one peripheral, two mutually exclusive roles.

use std::time::Duration;

use super::pcm::StereoFrame;

/// Role the bus is currently configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    /// Microphone source, mono.
    Capture,
    /// Speaker sink, stereo.
    Playback,
}

impl std::fmt::Display for BusMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capture => write!(f, "capture"),
            Self::Playback => write!(f, "playback"),
        }
    }
}

/// Driver for the audio peripheral.
///
/// Implementations hold at most one mode at a time. `configure` tears the
/// current mode down completely (draining pending output, discarding
/// pending input) before the new one is brought up.
pub trait AudioBus {
    /// Current mode, `None` before the first `configure`.
    fn mode(&self) -> Option<BusMode>;

    /// Switch roles. Blocking.
    fn configure(&mut self, mode: BusMode) -> anyhow::Result<()>;

    /// Read exactly one frame of `buf.len()` mono samples, waiting at most
    /// `timeout`. Returns `buf.len()`, or 0 when a whole frame did not arrive
    /// in time; samples already received are kept for the next read.
    fn read(&mut self, buf: &mut [i16], timeout: Duration) -> anyhow::Result<usize>;

    /// Write stereo frames, blocking until the sink accepted all of them.
    fn write(&mut self, frames: &[StereoFrame]) -> anyhow::Result<()>;
}
