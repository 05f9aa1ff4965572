//! Audio bus, PCM conversion, and the duplex capture/playback pipeline.

pub mod bus;
pub mod host;
pub mod pcm;
pub mod pipeline;
pub mod ring_buffer;

pub use bus::{AudioBus, BusMode};
pub use host::HostAudioBus;
pub use pipeline::{AudioPipeline, PipelineSettings};
