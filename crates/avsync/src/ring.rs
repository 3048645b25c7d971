//! Lock-free single-producer/single-consumer ring for interleaved audio samples.
//!
//! The decode context owns the [`RingProducer`], the realtime audio callback owns the
//! [`RingConsumer`]. Each cursor has exactly one writer:
//! - the producer stores `write` (and the flush fields)
//! - the consumer stores `read`
//!
//! Both sides only *load* the other side's cursor, so no compare-and-swap is needed. Cursors
//! are monotonically increasing sample counts; the slot index is `cursor % capacity`, and
//! `write - read` is the fill level, which never exceeds `capacity`.
//!
//! Nothing here allocates after construction.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Compute a ring capacity in **samples** for a `(rate, channels, seconds)` target.
///
/// - If `seconds` is non-finite or `<= 0.0`, a 0.5 s fallback is used.
/// - The returned value is `ceil(rate_hz * seconds) * channels` (saturating, at least one frame).
pub fn ring_capacity_samples(rate_hz: u32, channels: usize, seconds: f32) -> usize {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.5
    };

    let frames = ((rate_hz as f32 * secs).ceil() as usize).max(1);
    frames.saturating_mul(channels.max(1))
}

struct RingShared {
    /// Sample slots, `f32` stored as bits.
    slots: Box<[AtomicU32]>,
    capacity: usize,
    channels: usize,
    /// Written only by the producer.
    write: AtomicUsize,
    /// Written only by the consumer.
    read: AtomicUsize,
    /// Producer-owned: write position to discard up to on the next consumer call.
    flush_to: AtomicUsize,
    /// Producer-owned: bumped after `flush_to` is stored.
    flush_generation: AtomicU64,
    /// Producer-owned health counter.
    overflow_samples: AtomicU64,
    /// Consumer-owned health counter.
    underrun_samples: AtomicU64,
}

impl RingShared {
    fn fill(&self) -> usize {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Acquire);
        w.wrapping_sub(r).min(self.capacity)
    }
}

/// Build a ring of `capacity_samples` interleaved samples and split it into its two halves.
pub fn ring_transport(capacity_samples: usize, channels: usize) -> (RingProducer, RingConsumer) {
    let channels = channels.max(1);
    // Keep whole frames so a wrap never splits one.
    let capacity = capacity_samples.max(channels).div_ceil(channels) * channels;
    let shared = Arc::new(RingShared {
        slots: (0..capacity)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice(),
        capacity,
        channels,
        write: AtomicUsize::new(0),
        read: AtomicUsize::new(0),
        flush_to: AtomicUsize::new(0),
        flush_generation: AtomicU64::new(0),
        overflow_samples: AtomicU64::new(0),
        underrun_samples: AtomicU64::new(0),
    });
    (
        RingProducer {
            shared: shared.clone(),
        },
        RingConsumer {
            shared,
            seen_generation: 0,
        },
    )
}

/// Ring sized for `seconds` of audio at `rate_hz` x `channels`.
pub fn ring_for_duration(
    seconds: f32,
    rate_hz: u32,
    channels: usize,
) -> (RingProducer, RingConsumer) {
    ring_transport(ring_capacity_samples(rate_hz, channels, seconds), channels)
}

/// Writing half of the ring. Owned by the decode context.
pub struct RingProducer {
    shared: Arc<RingShared>,
}

impl RingProducer {
    /// Write up to `samples.len()` samples; returns how many were written.
    ///
    /// Never blocks. Whatever does not fit is left to the caller, which drops it.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let s = &self.shared;
        let w = s.write.load(Ordering::Relaxed);
        let r = s.read.load(Ordering::Acquire);
        let free = s.capacity - w.wrapping_sub(r).min(s.capacity);
        let n = free.min(samples.len());
        if n == 0 {
            return 0;
        }

        let start = w % s.capacity;
        let first = n.min(s.capacity - start);
        for (slot, &sample) in s.slots[start..start + first].iter().zip(&samples[..first]) {
            slot.store(sample.to_bits(), Ordering::Relaxed);
        }
        for (slot, &sample) in s.slots[..n - first].iter().zip(&samples[first..n]) {
            slot.store(sample.to_bits(), Ordering::Relaxed);
        }

        s.write.store(w.wrapping_add(n), Ordering::Release);
        n
    }

    /// Record samples the caller had to drop because the ring was full.
    pub fn note_overflow(&self, dropped: usize) {
        self.shared
            .overflow_samples
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    /// Ask the consumer to discard everything written so far.
    ///
    /// Takes effect on the consumer's next call; samples pushed after this remain readable.
    pub fn request_flush(&mut self) {
        let s = &self.shared;
        s.flush_to
            .store(s.write.load(Ordering::Relaxed), Ordering::Relaxed);
        s.flush_generation.fetch_add(1, Ordering::Release);
    }

    pub fn available_read(&self) -> usize {
        self.shared.fill()
    }

    pub fn available_write(&self) -> usize {
        self.shared.capacity - self.shared.fill()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            shared: self.shared.clone(),
        }
    }
}

/// Reading half of the ring. Owned by the realtime audio callback.
pub struct RingConsumer {
    shared: Arc<RingShared>,
    seen_generation: u64,
}

impl RingConsumer {
    /// Fill `out` completely: buffered samples first, then silence.
    ///
    /// Returns how many samples came from the ring.
    pub fn pop(&mut self, out: &mut [f32]) -> usize {
        self.apply_flush();
        let s = &self.shared;
        let r = s.read.load(Ordering::Relaxed);
        let w = s.write.load(Ordering::Acquire);
        let n = w.wrapping_sub(r).min(s.capacity).min(out.len());

        if n > 0 {
            let start = r % s.capacity;
            let first = n.min(s.capacity - start);
            for (dst, slot) in out[..first].iter_mut().zip(&s.slots[start..start + first]) {
                *dst = f32::from_bits(slot.load(Ordering::Relaxed));
            }
            for (dst, slot) in out[first..n].iter_mut().zip(&s.slots[..n - first]) {
                *dst = f32::from_bits(slot.load(Ordering::Relaxed));
            }
            s.read.store(r.wrapping_add(n), Ordering::Release);
        }

        if n < out.len() {
            out[n..].fill(0.0);
            s.underrun_samples
                .fetch_add((out.len() - n) as u64, Ordering::Relaxed);
        }
        n
    }

    /// Apply a pending producer flush, if any. Cheap enough to call every callback.
    pub fn apply_flush(&mut self) {
        let s = &self.shared;
        let generation = s.flush_generation.load(Ordering::Acquire);
        if generation == self.seen_generation {
            return;
        }
        self.seen_generation = generation;
        let target = s.flush_to.load(Ordering::Relaxed);
        let r = s.read.load(Ordering::Relaxed);
        // Only move forward: the read cursor may already be past the flush point.
        if target.wrapping_sub(r) <= s.capacity {
            s.read.store(target, Ordering::Release);
        }
    }

    pub fn available_read(&self) -> usize {
        self.shared.fill()
    }

    pub fn available_write(&self) -> usize {
        self.shared.capacity - self.shared.fill()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            shared: self.shared.clone(),
        }
    }
}

impl std::fmt::Debug for RingConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingConsumer")
            .field("capacity", &self.shared.capacity)
            .field("channels", &self.shared.channels)
            .field("buffered", &self.shared.fill())
            .finish()
    }
}

/// Read-only view for status reporting from any thread.
#[derive(Clone)]
pub struct RingMonitor {
    shared: Arc<RingShared>,
}

impl std::fmt::Debug for RingMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RingMonitor").field(&self.stats()).finish()
    }
}

/// Snapshot of ring fill and health counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RingStats {
    pub buffered_samples: usize,
    pub capacity_samples: usize,
    pub overflow_samples: u64,
    pub underrun_samples: u64,
}

impl RingMonitor {
    pub fn stats(&self) -> RingStats {
        let s = &self.shared;
        RingStats {
            buffered_samples: s.fill(),
            capacity_samples: s.capacity,
            overflow_samples: s.overflow_samples.load(Ordering::Relaxed),
            underrun_samples: s.underrun_samples.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn ring_capacity_samples_fallbacks() {
        assert_eq!(ring_capacity_samples(48_000, 2, 0.5), 48_000);
        assert_eq!(ring_capacity_samples(48_000, 2, -1.0), 48_000);
        assert_eq!(ring_capacity_samples(48_000, 2, f32::NAN), 48_000);
        assert_eq!(ring_capacity_samples(48_000, 2, f32::INFINITY), 48_000);
        assert_eq!(ring_capacity_samples(44_100, 1, 1.0), 44_100);
    }

    #[test]
    fn capacity_rounds_up_to_whole_frames() {
        let (p, _c) = ring_transport(7, 2);
        assert_eq!(p.capacity(), 8);
        assert_eq!(p.channels(), 2);
    }

    #[test]
    fn push_truncates_to_free_space() {
        let (mut p, c) = ring_transport(8, 1);
        assert_eq!(p.push(&[1.0; 5]), 5);
        assert_eq!(p.push(&[2.0; 5]), 3);
        assert_eq!(p.push(&[3.0]), 0);
        assert_eq!(c.available_read(), 8);
        assert_eq!(c.available_write(), 0);
    }

    #[test]
    fn pop_zero_fills_shortfall() {
        let (mut p, mut c) = ring_transport(8, 1);
        p.push(&[1.0, 2.0, 3.0]);
        let mut out = [9.0f32; 5];
        assert_eq!(c.pop(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0, 0.0, 0.0]);
        assert_eq!(c.monitor().stats().underrun_samples, 2);
    }

    #[test]
    fn wraps_across_capacity_boundary() {
        let (mut p, mut c) = ring_transport(4, 1);
        let mut out = [0.0f32; 3];
        p.push(&[1.0, 2.0, 3.0]);
        c.pop(&mut out);
        // write cursor now at 3: next push splits 1 + 2
        assert_eq!(p.push(&[4.0, 5.0, 6.0]), 3);
        assert_eq!(c.pop(&mut out), 3);
        assert_eq!(out, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn read_plus_write_equals_capacity_for_any_sequence() {
        let (mut p, mut c) = ring_transport(10, 1);
        let mut scratch = [0.0f32; 16];
        let ops: [(bool, usize); 10] = [
            (true, 3),
            (true, 9),
            (false, 4),
            (true, 6),
            (false, 16),
            (false, 2),
            (true, 10),
            (false, 7),
            (true, 1),
            (false, 1),
        ];
        let mut pushed = 0usize;
        let mut popped = 0usize;
        for (is_push, len) in ops {
            if is_push {
                let data: Vec<f32> = (0..len).map(|i| (pushed + i) as f32).collect();
                pushed += p.push(&data);
            } else {
                popped += c.pop(&mut scratch[..len]);
            }
            assert_eq!(p.available_read() + p.available_write(), p.capacity());
            assert_eq!(c.available_read(), pushed - popped);
        }
        assert!(popped <= pushed);
    }

    #[test]
    fn flush_discards_only_older_samples() {
        let (mut p, mut c) = ring_transport(8, 1);
        p.push(&[1.0, 2.0, 3.0]);
        p.request_flush();
        p.push(&[7.0, 8.0]);
        let mut out = [0.0f32; 4];
        assert_eq!(c.pop(&mut out), 2);
        assert_eq!(out, [7.0, 8.0, 0.0, 0.0]);
    }

    #[test]
    fn apply_flush_without_pop_discards_pending() {
        let (mut p, mut c) = ring_transport(8, 1);
        p.push(&[1.0, 2.0]);
        p.request_flush();
        let mut out = [0.0f32; 2];
        c.apply_flush();
        assert_eq!(c.available_read(), 0);
        p.push(&[3.0]);
        assert_eq!(c.pop(&mut out), 1);
        assert_eq!(out[0], 3.0);
    }

    #[test]
    fn overflow_counter_accumulates() {
        let (p, c) = ring_transport(4, 1);
        p.note_overflow(3);
        p.note_overflow(2);
        assert_eq!(c.monitor().stats().overflow_samples, 5);
    }

    #[test]
    fn spsc_threads_preserve_order() {
        let (mut p, mut c) = ring_transport(64, 1);
        let total = 10_000usize;
        let producer = thread::spawn(move || {
            let mut next = 0usize;
            while next < total {
                let end = (next + 17).min(total);
                let chunk: Vec<f32> = (next..end).map(|v| v as f32).collect();
                let written = p.push(&chunk);
                next += written;
                if written == 0 {
                    thread::yield_now();
                }
            }
        });

        let mut expected = 0usize;
        let mut out = [0.0f32; 13];
        while expected < total {
            let n = c.pop(&mut out);
            for &v in &out[..n] {
                assert_eq!(v, expected as f32);
                expected += 1;
            }
            if n == 0 {
                thread::yield_now();
            }
        }
        producer.join().unwrap();
    }
}
