//! Host audio bus: cpal input for capture, rodio sink for playback.
//!
//! Only one of the two is open at any time. Capture opens the input device
//! at its native rate, down-mixes and resamples to the operating rate, and
//! feeds a ring buffer the control loop reads from. Playback queues stereo
//! buffers on a rodio sink and blocks while the queue is full.

use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{error, info};

use super::bus::{AudioBus, BusMode};
use super::pcm::{f32_to_i16, StereoFrame};
use super::ring_buffer::{audio_ring_buffer, AudioConsumer};

/// Chunks queued on the sink before `write` blocks.
const MAX_QUEUED_CHUNKS: usize = 8;

/// Poll interval while waiting on the ring buffer or the sink.
const WAIT_STEP: Duration = Duration::from_millis(1);

/// Names accepted by the `input_device` config field.
pub fn list_devices() -> Vec<String> {
    match cpal::default_host().input_devices() {
        Ok(devices) => devices.filter_map(|dev| dev.name().ok()).collect(),
        Err(_) => Vec::new(),
    }
}

enum Active {
    Capture {
        stream: Stream,
        consumer: AudioConsumer,
    },
    Playback {
        _stream: OutputStream,
        _handle: OutputStreamHandle,
        sink: Sink,
    },
}

/// cpal/rodio-backed implementation of [`AudioBus`].
///
/// Holds `!Send` stream handles, so it must be created on the thread that
/// runs the control loop.
pub struct HostAudioBus {
    sample_rate: u32,
    input_device: Option<String>,
    output_device: Option<String>,
    active: Option<Active>,
}

impl HostAudioBus {
    pub fn new(sample_rate: u32, input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            sample_rate,
            input_device,
            output_device,
            active: None,
        }
    }

    /// Drain and close whatever is open.
    fn shutdown_active(&mut self) {
        match self.active.take() {
            Some(Active::Capture { stream, .. }) => {
                if let Err(e) = stream.pause() {
                    error!("Failed to pause input stream: {}", e);
                }
            }
            Some(Active::Playback { sink, .. }) => {
                sink.sleep_until_end();
            }
            None => {}
        }
    }

    fn open_capture(&self) -> anyhow::Result<Active> {
        let host = cpal::default_host();
        let device = match self.input_device.as_deref() {
            Some(name) => host
                .input_devices()
                .context("Failed to enumerate input devices")?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("Input device not found: {name}"))?,
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow!("No default input device available"))?,
        };

        let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
        let default_config = device
            .default_input_config()
            .context("Failed to get default input config")?;
        let native_rate = default_config.sample_rate().0;
        let channels = default_config.channels();
        let stream_config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(native_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            device = %dev_name,
            native_rate,
            channels,
            "Opening capture (resampled to {}Hz mono)",
            self.sample_rate,
        );

        let target_rate = self.sample_rate;
        let (mut producer, consumer) = audio_ring_buffer(Some(target_rate as usize));
        let mut converted: Vec<i16> = Vec::new();

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = to_mono(data, channels);
                    let resampled = resample_linear(&mono, native_rate, target_rate);
                    converted.clear();
                    converted.extend(resampled.iter().map(|&s| f32_to_i16(s)));
                    // Full buffer: newest samples are lost until the loop catches up.
                    producer.push_slice(&converted);
                },
                move |err| {
                    error!("Audio input stream error: {}", err);
                },
                None,
            )
            .context("Failed to build input stream")?;
        stream.play().context("Failed to start input stream")?;

        Ok(Active::Capture { stream, consumer })
    }

    fn open_playback(&self) -> anyhow::Result<Active> {
        let (stream, handle) = match self.output_device.as_deref() {
            Some(name) => {
                let device = cpal::default_host()
                    .output_devices()
                    .context("Failed to enumerate output devices")?
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("Output device not found: {name}"))?;
                OutputStream::try_from_device(&device)
                    .map_err(|e| anyhow!("Failed to open audio output: {}", e))?
            }
            None => OutputStream::try_default()
                .map_err(|e| anyhow!("Failed to open audio output: {}", e))?,
        };
        let sink =
            Sink::try_new(&handle).map_err(|e| anyhow!("Failed to create audio sink: {}", e))?;
        info!(device = ?self.output_device, "Opening playback");

        Ok(Active::Playback {
            _stream: stream,
            _handle: handle,
            sink,
        })
    }
}

impl AudioBus for HostAudioBus {
    fn mode(&self) -> Option<BusMode> {
        match self.active {
            Some(Active::Capture { .. }) => Some(BusMode::Capture),
            Some(Active::Playback { .. }) => Some(BusMode::Playback),
            None => None,
        }
    }

    fn configure(&mut self, mode: BusMode) -> anyhow::Result<()> {
        self.shutdown_active();
        let active = match mode {
            BusMode::Capture => self.open_capture()?,
            BusMode::Playback => self.open_playback()?,
        };
        self.active = Some(active);
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16], timeout: Duration) -> anyhow::Result<usize> {
        let Some(Active::Capture { consumer, .. }) = self.active.as_mut() else {
            bail!("audio bus is not in capture mode");
        };
        Ok(take_frame(consumer, buf, timeout))
    }

    fn write(&mut self, frames: &[StereoFrame]) -> anyhow::Result<()> {
        let Some(Active::Playback { sink, .. }) = self.active.as_ref() else {
            bail!("audio bus is not in playback mode");
        };
        if frames.is_empty() {
            return Ok(());
        }
        while sink.len() >= MAX_QUEUED_CHUNKS {
            std::thread::sleep(WAIT_STEP);
        }
        let interleaved: Vec<i16> = frames.iter().flatten().copied().collect();
        sink.append(SamplesBuffer::new(2, self.sample_rate, interleaved));
        Ok(())
    }
}

impl Drop for HostAudioBus {
    fn drop(&mut self) {
        self.shutdown_active();
    }
}

/// Wait up to `timeout` for a whole frame, then pop it.
///
/// Returns 0 when fewer than `buf.len()` samples arrived in time; the
/// partial frame stays in the ring and completes on a later tick.
fn take_frame(consumer: &mut AudioConsumer, buf: &mut [i16], timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    while consumer.available() < buf.len() {
        if Instant::now() >= deadline {
            return 0;
        }
        std::thread::sleep(WAIT_STEP);
    }
    consumer.pop_slice(buf)
}

/// Bring the device's native rate down (or up) to the bus rate before the
/// samples are quantized to i16. Linear interpolation is plenty for speech.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Average interleaved input channels into the single channel the bridge
/// expects.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}
