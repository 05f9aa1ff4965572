//! In-memory stand-ins for the platform, shared by unit tests.

use std::cell::Cell;
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::bail;

use crate::audio::pcm::StereoFrame;
use crate::audio::{AudioBus, BusMode};
use crate::bridge::{BridgeSender, Outbound};
use crate::platform::{ButtonPin, Clock, Indicator, Level, PowerControl};

/// Bus that records every configuration and write.
#[derive(Debug, Default)]
pub struct MockBus {
    mode: Option<BusMode>,
    pub mode_history: Vec<BusMode>,
    input: VecDeque<i16>,
    pub writes: Vec<Vec<StereoFrame>>,
}

impl MockBus {
    /// Samples the "microphone" will deliver.
    pub fn queue_input(&mut self, samples: &[i16]) {
        self.input.extend(samples.iter().copied());
    }
}

impl AudioBus for MockBus {
    fn mode(&self) -> Option<BusMode> {
        self.mode
    }

    fn configure(&mut self, mode: BusMode) -> anyhow::Result<()> {
        // Torn down first, so there is never a moment with both roles.
        self.mode = None;
        self.input.clear();
        self.mode = Some(mode);
        self.mode_history.push(mode);
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16], _timeout: Duration) -> anyhow::Result<usize> {
        if self.mode != Some(BusMode::Capture) {
            bail!("read while not capturing");
        }
        // Whole frames only; a short queue behaves like a timeout.
        let n = buf.len();
        if self.input.len() < n {
            return Ok(0);
        }
        for (slot, sample) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = sample;
        }
        Ok(n)
    }

    fn write(&mut self, frames: &[StereoFrame]) -> anyhow::Result<()> {
        if self.mode != Some(BusMode::Playback) {
            bail!("write while not playing");
        }
        self.writes.push(frames.to_vec());
        Ok(())
    }
}

/// Link that keeps everything it was asked to send.
#[derive(Debug)]
pub struct RecordingLink {
    pub connected: bool,
    pub control: Vec<Outbound>,
    pub audio: Vec<Vec<u8>>,
}

impl Default for RecordingLink {
    fn default() -> Self {
        Self {
            connected: true,
            control: Vec::new(),
            audio: Vec::new(),
        }
    }
}

impl BridgeSender for RecordingLink {
    fn send_control(&mut self, message: &Outbound) -> bool {
        if self.connected {
            self.control.push(message.clone());
        }
        self.connected
    }

    fn send_audio(&mut self, bytes: &[u8]) -> bool {
        if self.connected {
            self.audio.push(bytes.to_vec());
        }
        self.connected
    }
}

#[derive(Debug, Default)]
pub struct MockIndicator {
    pub on: bool,
    pub changes: Vec<bool>,
}

impl Indicator for MockIndicator {
    fn set(&mut self, on: bool) {
        self.on = on;
        self.changes.push(on);
    }
}

#[derive(Debug, Default)]
pub struct MockPower {
    pub entered: u32,
}

impl PowerControl for MockPower {
    fn enter_low_power(&mut self) {
        self.entered += 1;
    }
}

/// Manual clock; `sleep` just moves time forward.
#[derive(Debug, Default)]
pub struct MockClock {
    now: Cell<u64>,
}

impl MockClock {
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration.as_millis() as u64);
    }
}

/// Button with a settable level and an optional scripted sequence of reads.
#[derive(Debug)]
pub struct MockPin {
    level: Level,
    script: VecDeque<Level>,
}

impl Default for MockPin {
    fn default() -> Self {
        Self {
            level: Level::High,
            script: VecDeque::new(),
        }
    }
}

impl MockPin {
    pub fn set(&mut self, level: Level) {
        self.level = level;
    }

    /// Levels returned by the next reads before falling back to `set`.
    pub fn script(&mut self, levels: &[Level]) {
        self.script.extend(levels.iter().copied());
    }
}

impl ButtonPin for MockPin {
    fn read(&mut self) -> Level {
        self.script.pop_front().unwrap_or(self.level)
    }
}
