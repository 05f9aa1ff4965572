//! Linear PCM helpers: wire encoding, input gain, channel expansion.
//!
//! Samples travel as little-endian signed 16-bit. A trailing odd byte on an
//! inbound buffer is not a sample and is dropped.

use byteorder::{ByteOrder, LittleEndian};

/// One interleaved left/right sample pair.
pub type StereoFrame = [i16; 2];

/// Multiply by `gain` and clamp to the i16 range. Never wraps.
pub fn apply_gain(samples: &mut [i16], gain: i32) {
    for s in samples.iter_mut() {
        let boosted = (*s as i32).saturating_mul(gain);
        *s = boosted.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
}

/// Encode samples as little-endian bytes into `out` (cleared first).
pub fn encode_le(samples: &[i16], out: &mut Vec<u8>) {
    out.clear();
    out.resize(samples.len() * 2, 0);
    LittleEndian::write_i16_into(samples, out);
}

/// Decode little-endian bytes into samples.
pub fn decode_le(bytes: &[u8]) -> Vec<i16> {
    let n = bytes.len() / 2;
    let mut samples = vec![0i16; n];
    LittleEndian::read_i16_into(&bytes[..n * 2], &mut samples);
    samples
}

/// Duplicate each mono sample into both channel slots.
pub fn mono_to_stereo(mono: &[i16], out: &mut Vec<StereoFrame>) {
    out.clear();
    out.extend(mono.iter().map(|&s| [s, s]));
}

/// f32 [-1, 1] to i16, clamping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
