//! Duplex audio pipeline over the shared bus.
//!
//! Capture: one bounded read per tick, fixed gain with saturation, frame out
//! on the link's binary channel. Playback: mono frames from the bridge,
//! expanded to stereo and written in frame-sized chunks with blocking
//! writes so nothing is dropped when the sink is full.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::bus::{AudioBus, BusMode};
use super::pcm::{apply_gain, decode_le, encode_le, mono_to_stereo, StereoFrame};
use crate::bridge::BridgeSender;
use crate::config::DeviceConfig;

/// Fixed pipeline parameters.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub gain: i32,
    pub frame_samples: usize,
    pub read_timeout: Duration,
}

impl From<&DeviceConfig> for PipelineSettings {
    fn from(cfg: &DeviceConfig) -> Self {
        Self {
            gain: cfg.mic_gain,
            frame_samples: cfg.frame_samples(),
            read_timeout: Duration::from_millis(cfg.capture_timeout_ms),
        }
    }
}

pub struct AudioPipeline<B: AudioBus> {
    bus: B,
    settings: PipelineSettings,
    capture_buf: Vec<i16>,
    wire_buf: Vec<u8>,
    stereo_buf: Vec<StereoFrame>,
}

impl<B: AudioBus> AudioPipeline<B> {
    pub fn new(bus: B, settings: PipelineSettings) -> Self {
        Self {
            bus,
            settings,
            capture_buf: vec![0; settings.frame_samples],
            wire_buf: Vec::with_capacity(settings.frame_samples * 2),
            stereo_buf: Vec::with_capacity(settings.frame_samples),
        }
    }

    pub fn mode(&self) -> Option<BusMode> {
        self.bus.mode()
    }

    /// Switch the bus to `mode` unless it is already there.
    pub fn ensure_mode(&mut self, mode: BusMode) -> anyhow::Result<()> {
        if self.bus.mode() == Some(mode) {
            return Ok(());
        }
        info!(from = ?self.bus.mode(), to = %mode, "Switching audio bus");
        self.bus.configure(mode)
    }

    /// Read, amplify and send one capture frame.
    ///
    /// Returns `true` when a frame was produced. A timeout (no whole frame
    /// yet) or a bus error both mean "no data this tick".
    pub fn capture_tick<S: BridgeSender>(&mut self, link: &mut S) -> bool {
        if self.bus.mode() != Some(BusMode::Capture) {
            return false;
        }

        let n = match self.bus.read(&mut self.capture_buf, self.settings.read_timeout) {
            Ok(n) => n,
            Err(e) => {
                debug!("Capture read failed: {:#}", e);
                return false;
            }
        };
        if n == 0 {
            return false;
        }

        let frame = &mut self.capture_buf[..n];
        apply_gain(frame, self.settings.gain);
        encode_le(frame, &mut self.wire_buf);

        if !link.send_audio(&self.wire_buf) {
            debug!(samples = n, "Capture frame dropped, link down");
        }
        true
    }

    /// Play one inbound mono frame, switching the bus to playback first if
    /// needed. Blocks until the sink has taken every chunk.
    pub fn playback_tick(&mut self, frame_bytes: &[u8]) -> anyhow::Result<()> {
        self.ensure_mode(BusMode::Playback)?;

        let samples = decode_le(frame_bytes);
        if samples.is_empty() {
            warn!(bytes = frame_bytes.len(), "Ignoring audio frame without samples");
            return Ok(());
        }

        for chunk in samples.chunks(self.settings.frame_samples) {
            mono_to_stereo(chunk, &mut self.stereo_buf);
            self.bus.write(&self.stereo_buf)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn bus(&self) -> &B {
        &self.bus
    }

    #[cfg(test)]
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
