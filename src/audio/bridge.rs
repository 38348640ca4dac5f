//! Network-to-render audio bridge
//!
//! Inbound sample batches arrive at irregular intervals and sizes; the
//! renderer pulls fixed-size quanta at its own cadence. The bridge owns a
//! [`RingBuffer`] between the two and never blocks either side.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::audio::buffer::{RingBuffer, RingBufferStats, SILENCE};

/// Bridge between the network arrival domain and the render pull domain
pub struct AudioBridge {
    buffer: RingBuffer,
    open: AtomicBool,
    batches_received: AtomicU64,
    frames_requested: AtomicU64,
    /// Samples the renderer asked for that had to be synthesized as silence
    silence_frames: AtomicU64,
}

impl AudioBridge {
    /// Create a bridge backed by a ring of `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RingBuffer::new(capacity),
            open: AtomicBool::new(true),
            batches_received: AtomicU64::new(0),
            frames_requested: AtomicU64::new(0),
            silence_frames: AtomicU64::new(0),
        }
    }

    /// Push an inbound batch in arrival order
    ///
    /// Batches delivered after [`close`](Self::close) are discarded.
    pub fn on_network_batch(&self, samples: &[f32]) {
        if !self.open.load(Ordering::Acquire) {
            return;
        }
        self.buffer.push_slice(samples);
        self.batches_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Pull exactly `frame_count` samples, padding any shortfall with silence
    pub fn pull(&self, frame_count: usize) -> Vec<f32> {
        let mut out = vec![SILENCE; frame_count];
        self.pull_into(&mut out);
        out
    }

    /// Fill `out` completely without allocating
    ///
    /// This is the variant to call from a real-time callback.
    pub fn pull_into(&self, out: &mut [f32]) {
        self.frames_requested
            .fetch_add(out.len() as u64, Ordering::Relaxed);

        if !self.open.load(Ordering::Acquire) {
            out.fill(SILENCE);
            self.silence_frames
                .fetch_add(out.len() as u64, Ordering::Relaxed);
            return;
        }

        let available = self.buffer.size().min(out.len());
        let (filled, missing) = out.split_at_mut(available);
        for slot in filled.iter_mut() {
            *slot = self.buffer.pop();
        }
        if !missing.is_empty() {
            missing.fill(SILENCE);
            self.silence_frames
                .fetch_add(missing.len() as u64, Ordering::Relaxed);
        }
    }

    /// Pull a single sample; silence when nothing is buffered
    #[inline]
    pub fn pull_sample(&self) -> f32 {
        if !self.open.load(Ordering::Acquire) {
            return SILENCE;
        }
        self.buffer.pop()
    }

    /// Number of samples waiting to be rendered
    pub fn buffered(&self) -> usize {
        self.buffer.size()
    }

    /// Re-initialize for a new session: cursors and counters zeroed
    pub fn reset(&self) {
        self.buffer.reset();
        self.batches_received.store(0, Ordering::Relaxed);
        self.frames_requested.store(0, Ordering::Relaxed);
        self.silence_frames.store(0, Ordering::Relaxed);
        self.open.store(true, Ordering::Release);
    }

    /// Stop accepting batches; subsequent pulls render silence
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Check if the bridge accepts batches
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Get statistics
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            buffer: self.buffer.stats(),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            frames_requested: self.frames_requested.load(Ordering::Relaxed),
            silence_frames: self.silence_frames.load(Ordering::Relaxed),
        }
    }
}

/// Bridge statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BridgeStats {
    pub buffer: RingBufferStats,
    pub batches_received: u64,
    pub frames_requested: u64,
    pub silence_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_returns_exact_length() {
        let bridge = AudioBridge::new(64);
        bridge.on_network_batch(&[0.1, 0.2, 0.3]);

        let out = bridge.pull(8);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..3], &[0.1, 0.2, 0.3]);
        assert!(out[3..].iter().all(|&s| s == SILENCE));
        assert_eq!(bridge.stats().silence_frames, 5);
    }

    #[test]
    fn test_irregular_batches_keep_arrival_order() {
        let bridge = AudioBridge::new(1024);
        bridge.on_network_batch(&[1.0]);
        bridge.on_network_batch(&[2.0, 3.0, 4.0, 5.0]);
        bridge.on_network_batch(&[6.0, 7.0]);

        assert_eq!(bridge.pull(4), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(bridge.pull(4), vec![5.0, 6.0, 7.0, 0.0]);
        assert_eq!(bridge.stats().batches_received, 3);
    }

    #[test]
    fn test_pull_on_empty_bridge() {
        let bridge = AudioBridge::new(16);
        assert_eq!(bridge.pull(128), vec![SILENCE; 128]);
        assert_eq!(bridge.pull(0), Vec::<f32>::new());
    }

    #[test]
    fn test_close_and_reset() {
        let bridge = AudioBridge::new(16);
        bridge.on_network_batch(&[0.5; 4]);
        bridge.close();
        bridge.on_network_batch(&[0.9; 4]);
        assert_eq!(bridge.pull(2), vec![SILENCE; 2]);

        bridge.reset();
        assert!(bridge.is_open());
        assert_eq!(bridge.buffered(), 0);
        bridge.on_network_batch(&[0.25]);
        assert_eq!(bridge.pull_sample(), 0.25);
    }
}
