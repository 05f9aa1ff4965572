//! Lock-free SPSC ring buffer for captured samples.
//!
//! Uses the `ringbuf` crate to hand i16 samples from the cpal callback
//! thread to the control loop without locks.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~1 second of 16 kHz mono audio.
const DEFAULT_CAPACITY: usize = 16_000;

/// Producer half, lives in the cpal audio callback.
pub struct AudioProducer {
    inner: ringbuf::HeapProd<i16>,
}

/// Consumer half, lives on the control loop thread.
pub struct AudioConsumer {
    inner: ringbuf::HeapCons<i16>,
}

/// Create a matched producer/consumer pair backed by a lock-free ring buffer.
pub fn audio_ring_buffer(capacity: Option<usize>) -> (AudioProducer, AudioConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    let rb = HeapRb::<i16>::new(cap);
    let (prod, cons) = rb.split();
    (AudioProducer { inner: prod }, AudioConsumer { inner: cons })
}

impl AudioProducer {
    /// Push samples; returns how many fit. Excess is dropped.
    pub fn push_slice(&mut self, samples: &[i16]) -> usize {
        self.inner.push_slice(samples)
    }
}

impl AudioConsumer {
    /// Pop up to `buf.len()` samples. Returns the number read.
    pub fn pop_slice(&mut self, buf: &mut [i16]) -> usize {
        self.inner.pop_slice(buf)
    }

    /// Number of samples currently available for reading.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }
}
