//! Render-side frame buffer and closest-timestamp selection.

use std::collections::VecDeque;

use crate::frame::VideoFrame;
use crate::protocol::RetiredFrames;

/// Decoded frames awaiting presentation, in arrival order.
///
/// Frames consumed by selection are counted in [`RetiredFrames`]; the decode context uses that
/// count to keep the number of outstanding frames under the target depth. Frames thrown away
/// by a flush or a stale-epoch discard are not retired: the decode context rebases its own
/// count when it repositions, so retiring them would double count.
pub struct FrameBuffer {
    frames: VecDeque<VideoFrame>,
    depth: usize,
    retired: RetiredFrames,
    last_pushed_us: Option<i64>,
    out_of_order: u64,
    abandoned: u64,
}

impl FrameBuffer {
    pub fn new(depth: usize, retired: RetiredFrames) -> Self {
        let depth = depth.max(1);
        Self {
            frames: VecDeque::with_capacity(depth + 1),
            depth,
            retired,
            last_pushed_us: None,
            out_of_order: 0,
            abandoned: 0,
        }
    }

    pub fn push(&mut self, frame: VideoFrame) {
        let ts = frame.timestamp_us();
        if self.last_pushed_us.is_some_and(|last| ts < last) {
            self.out_of_order += 1;
            tracing::debug!(frame = %frame.id(), ts, "frame arrived out of order");
        }
        self.last_pushed_us = Some(ts);
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// At depth: the decode side should hold off.
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.depth
    }

    pub fn out_of_order(&self) -> u64 {
        self.out_of_order
    }

    pub fn retired(&self) -> u64 {
        self.retired.get()
    }

    /// Frames released by [`flush`](Self::flush) or [`discard`](Self::discard).
    pub fn abandoned(&self) -> u64 {
        self.abandoned
    }

    /// Earliest buffered timestamp.
    pub fn earliest_us(&self) -> Option<i64> {
        self.frames.iter().map(|f| f.timestamp_us()).min()
    }

    /// Remove and return the frame closest to `target_us`.
    ///
    /// Ties go to the earliest index. Every frame before the selected one is stale and is
    /// released.
    pub fn select(&mut self, target_us: i64) -> Option<VideoFrame> {
        let (idx, _) = self
            .frames
            .iter()
            .enumerate()
            .min_by_key(|(i, f)| (f.timestamp_us().abs_diff(target_us), *i))?;

        for stale in self.frames.drain(..idx) {
            tracing::trace!(frame = %stale.id(), ts = stale.timestamp_us(), target_us, "evict stale frame");
            stale.release();
        }
        let selected = self.frames.pop_front();
        self.retired.retire(idx as u64 + 1);
        selected
    }

    /// [`select`](Self::select), but only once the earliest frame is due.
    ///
    /// A frame is due when its timestamp is no later than `target_us + lead_us`.
    pub fn next_due(&mut self, target_us: i64, lead_us: i64) -> Option<VideoFrame> {
        let earliest = self.earliest_us()?;
        if earliest > target_us.saturating_add(lead_us) {
            return None;
        }
        self.select(target_us)
    }

    /// Release every buffered frame without retiring it. Returns how many there were.
    pub fn flush(&mut self) -> usize {
        let n = self.frames.len();
        for frame in self.frames.drain(..) {
            frame.release();
        }
        self.abandoned += n as u64;
        self.last_pushed_us = None;
        n
    }

    /// Release a frame that arrived but will never be buffered (stale epoch).
    pub fn discard(&mut self, frame: VideoFrame) {
        frame.release();
        self.abandoned += 1;
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFate, FrameLedger, PixelFormat};
    use crate::protocol::retired_counter;
    use std::sync::Arc;

    fn tracked(ledger: &Arc<FrameLedger>, ts: i64) -> VideoFrame {
        let mut f = VideoFrame::new(vec![0; 4], PixelFormat::Rgba8, 1, 1, ts);
        f.track(ledger);
        f
    }

    #[test]
    fn select_picks_closest_and_releases_stale() {
        let ledger = FrameLedger::instrumented();
        let (retired, view) = retired_counter();
        let mut buf = FrameBuffer::new(3, retired);
        let a = tracked(&ledger, 0);
        let b = tracked(&ledger, 33_000);
        let c = tracked(&ledger, 66_000);
        let (ida, idb, idc) = (a.id(), b.id(), c.id());
        buf.push(a);
        buf.push(b);
        buf.push(c);
        assert!(buf.is_full());

        let picked = buf.select(40_000).unwrap();
        assert_eq!(picked.id(), idb);
        assert_eq!(ledger.fate(ida), Some(FrameFate::Released));
        assert_eq!(ledger.fate(idc), Some(FrameFate::Live));
        assert_eq!(buf.len(), 1);
        assert_eq!(view.get(), 2);
        picked.release();
    }

    #[test]
    fn extreme_timestamps_do_not_overflow_the_distance() {
        let (retired, _view) = retired_counter();
        let mut buf = FrameBuffer::new(3, retired);
        buf.push(VideoFrame::new(vec![], PixelFormat::Rgba8, 0, 0, i64::MIN));
        buf.push(VideoFrame::new(vec![], PixelFormat::Rgba8, 0, 0, i64::MAX));
        let picked = buf.select(i64::MAX).unwrap();
        assert_eq!(picked.timestamp_us(), i64::MAX);
        assert!(buf.is_empty());
    }

    #[test]
    fn ties_go_to_the_earliest_index() {
        let (retired, _view) = retired_counter();
        let mut buf = FrameBuffer::new(3, retired);
        buf.push(VideoFrame::new(vec![], PixelFormat::Rgba8, 0, 0, 10));
        buf.push(VideoFrame::new(vec![], PixelFormat::Rgba8, 0, 0, 30));
        let picked = buf.select(20).unwrap();
        assert_eq!(picked.timestamp_us(), 10);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn empty_buffer_selects_nothing() {
        let (retired, view) = retired_counter();
        let mut buf = FrameBuffer::new(3, retired);
        assert!(buf.select(0).is_none());
        assert!(buf.next_due(0, 8_000).is_none());
        assert_eq!(view.get(), 0);
    }

    #[test]
    fn next_due_waits_for_the_clock() {
        let (retired, _view) = retired_counter();
        let mut buf = FrameBuffer::new(3, retired);
        buf.push(VideoFrame::new(vec![], PixelFormat::Rgba8, 0, 0, 100_000));
        assert!(buf.next_due(80_000, 8_000).is_none());
        assert!(buf.next_due(92_000, 8_000).is_some());
    }

    #[test]
    fn reordered_frames_still_select_closest() {
        let (retired, _view) = retired_counter();
        let mut buf = FrameBuffer::new(4, retired);
        for ts in [0, 66_000, 33_000] {
            buf.push(VideoFrame::new(vec![], PixelFormat::Rgba8, 0, 0, ts));
        }
        assert_eq!(buf.out_of_order(), 1);
        assert_eq!(buf.select(30_000).unwrap().timestamp_us(), 33_000);
        assert!(buf.is_empty());
    }

    #[test]
    fn flush_and_discard_release_without_retiring() {
        let ledger = FrameLedger::instrumented();
        let (retired, view) = retired_counter();
        let mut buf = FrameBuffer::new(3, retired);
        buf.push(tracked(&ledger, 0));
        buf.push(tracked(&ledger, 1));
        assert_eq!(buf.flush(), 2);
        buf.discard(tracked(&ledger, 2));
        assert_eq!(view.get(), 0);
        assert_eq!(buf.abandoned(), 3);
        let stats = ledger.stats();
        assert_eq!(stats.released, 3);
        assert!(stats.is_balanced());
    }
}
