//! Lock-free ring buffer for audio samples
//!
//! Single-producer single-consumer circular buffer sitting between network
//! arrival and the real-time render pull. One slot is always left empty so
//! that `read == write` unambiguously means "empty"; at most `capacity - 1`
//! samples are resident. A push into a full buffer overwrites the oldest
//! unread sample, and a pop from an empty buffer yields silence.

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Value returned by `pop` when nothing is buffered
pub const SILENCE: f32 = 0.0;

/// Lock-free ring buffer of `f32` samples
pub struct RingBuffer {
    /// Samples stored as raw `f32` bits
    slots: Box<[AtomicU32]>,
    capacity: usize,
    write: CachePadded<AtomicUsize>,
    read: CachePadded<AtomicUsize>,
    /// Diagnostic counters, never used for correctness
    pushed: AtomicU64,
    popped: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
}

impl RingBuffer {
    /// Create a new ring buffer with `capacity` slots
    ///
    /// Capacity below 2 is raised to 2, since one slot is always kept free.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        let slots = (0..capacity)
            .map(|_| AtomicU32::new(SILENCE.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            capacity,
            write: CachePadded::new(AtomicUsize::new(0)),
            read: CachePadded::new(AtomicUsize::new(0)),
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    #[inline]
    fn advance(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.capacity {
            0
        } else {
            next
        }
    }

    /// Write a sample at the write cursor (producer side)
    ///
    /// When the buffer is full the oldest unread sample is dropped to make
    /// room; the overrun counter records it.
    #[inline]
    pub fn push(&self, sample: f32) {
        let write = self.write.load(Ordering::Relaxed);
        let next = self.advance(write);

        let read = self.read.load(Ordering::Acquire);
        if next == read {
            // Full. If the consumer moved first the slot is already free.
            if self
                .read
                .compare_exchange(read, self.advance(read), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.overruns.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.slots[write].store(sample.to_bits(), Ordering::Relaxed);
        self.write.store(next, Ordering::Release);
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Push every sample of a slice in order
    pub fn push_slice(&self, samples: &[f32]) {
        for &sample in samples {
            self.push(sample);
        }
    }

    /// Read the sample at the read cursor (consumer side)
    ///
    /// Returns [`SILENCE`] without moving either cursor when empty.
    #[inline]
    pub fn pop(&self) -> f32 {
        loop {
            let read = self.read.load(Ordering::Acquire);
            let write = self.write.load(Ordering::Acquire);
            if read == write {
                self.underruns.fetch_add(1, Ordering::Relaxed);
                return SILENCE;
            }

            let bits = self.slots[read].load(Ordering::Relaxed);
            // The producer may have dropped this slot while we were reading it.
            if self
                .read
                .compare_exchange(read, self.advance(read), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.popped.fetch_add(1, Ordering::Relaxed);
                return f32::from_bits(bits);
            }
        }
    }

    /// Number of unread samples
    pub fn size(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        if write < read {
            write + self.capacity - read
        } else {
            write - read
        }
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.size() == self.capacity - 1
    }

    /// Get buffer capacity (slots, one of which is always free)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Zero both cursors and all counters
    ///
    /// Only valid while neither producer nor consumer is running.
    pub fn reset(&self) {
        self.write.store(0, Ordering::Release);
        self.read.store(0, Ordering::Release);
        self.pushed.store(0, Ordering::Relaxed);
        self.popped.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
    }

    /// Get fill level as a fraction of usable slots
    pub fn fill_level(&self) -> f32 {
        self.size() as f32 / (self.capacity - 1) as f32
    }

    /// Get statistics
    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            size: self.size(),
            capacity: self.capacity,
            fill_level: self.fill_level(),
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}

/// Ring buffer statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RingBufferStats {
    pub size: usize,
    pub capacity: usize,
    pub fill_level: f32,
    pub pushed: u64,
    pub popped: u64,
    pub overruns: u64,
    pub underruns: u64,
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a new shared ring buffer
pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ring_buffer_basic() {
        let buffer = RingBuffer::new(4);

        buffer.push(0.25);
        buffer.push(-0.5);
        assert_eq!(buffer.size(), 2);

        assert_eq!(buffer.pop(), 0.25);
        assert_eq!(buffer.pop(), -0.5);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_push_then_pop_returns_value() {
        let buffer = RingBuffer::new(8);
        buffer.push(0.75);
        assert_eq!(buffer.pop(), 0.75);
    }

    #[test]
    fn test_empty_pop_is_silence() {
        let buffer = RingBuffer::new(8);
        for _ in 0..5 {
            assert_eq!(buffer.pop(), SILENCE);
        }
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.stats().underruns, 5);

        // Cursors were left consistent
        buffer.push(1.0);
        assert_eq!(buffer.size(), 1);
        assert_eq!(buffer.pop(), 1.0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let buffer = RingBuffer::new(4);
        for i in 0..6 {
            buffer.push(i as f32);
        }

        assert_eq!(buffer.size(), 3);
        assert!(buffer.is_full());
        assert_eq!(buffer.stats().overruns, 3);
        assert_eq!(buffer.pop(), 3.0);
        assert_eq!(buffer.pop(), 4.0);
        assert_eq!(buffer.pop(), 5.0);
        assert_eq!(buffer.pop(), SILENCE);
    }

    #[test]
    fn test_size_across_wraparound() {
        let buffer = RingBuffer::new(5);
        for i in 0..4 {
            buffer.push(i as f32);
        }
        for _ in 0..3 {
            buffer.pop();
        }
        // write cursor wraps to before the read cursor
        buffer.push(10.0);
        buffer.push(11.0);
        assert_eq!(buffer.size(), 3);
        assert_eq!(buffer.pop(), 3.0);
        assert_eq!(buffer.pop(), 10.0);
        assert_eq!(buffer.pop(), 11.0);
    }

    #[test]
    fn test_reset() {
        let buffer = RingBuffer::new(16);
        buffer.push_slice(&[1.0, 2.0, 3.0]);
        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.stats().pushed, 0);
        assert_eq!(buffer.pop(), SILENCE);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let buffer = create_shared_buffer(1024);
        let producer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    buffer.push(i as f32);
                }
            })
        };

        let mut last = -1.0f32;
        let mut received = 0;
        while received < 500 {
            let sample = buffer.pop();
            if sample != SILENCE {
                // Values are strictly increasing even with drops
                assert!(sample > last);
                last = sample;
                received += 1;
            }
            if producer.is_finished() && buffer.is_empty() {
                break;
            }
        }
        producer.join().unwrap();
        assert!(buffer.size() <= buffer.capacity() - 1);
    }

    proptest! {
        #[test]
        fn size_never_exceeds_capacity_minus_one(
            capacity in 2usize..64,
            ops in proptest::collection::vec(any::<bool>(), 0..512),
        ) {
            let buffer = RingBuffer::new(capacity);
            let mut model = std::collections::VecDeque::new();
            for (i, push) in ops.into_iter().enumerate() {
                if push {
                    let value = (i + 1) as f32;
                    buffer.push(value);
                    model.push_back(value);
                    if model.len() > capacity - 1 {
                        model.pop_front();
                    }
                } else {
                    let expected = model.pop_front().unwrap_or(SILENCE);
                    prop_assert_eq!(buffer.pop(), expected);
                }
                prop_assert!(buffer.size() <= capacity - 1);
                prop_assert_eq!(buffer.size(), model.len());
            }
        }
    }
}
