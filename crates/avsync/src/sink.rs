//! Render sinks: where selected frames end up.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Receiver;

use crate::error::RenderError;
use crate::frame::VideoFrame;

pub enum DrawOutcome {
    Done,
    /// The draw completes asynchronously; the next draw waits for this to settle.
    Pending(Receiver<Result<(), RenderError>>),
}

/// Consumer of presented frames. Takes ownership of one frame per call.
pub trait RenderSink: Send {
    fn draw(&mut self, frame: VideoFrame) -> Result<DrawOutcome, RenderError>;
}

impl<F> RenderSink for F
where
    F: FnMut(VideoFrame) -> Result<(), RenderError> + Send,
{
    fn draw(&mut self, frame: VideoFrame) -> Result<DrawOutcome, RenderError> {
        self(frame).map(|()| DrawOutcome::Done)
    }
}

/// Sink that releases every frame and counts it. Used when no display is attached.
#[derive(Clone, Default)]
pub struct NullSink {
    drawn: Arc<AtomicU64>,
    last_timestamp_us: Arc<AtomicU64>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drawn(&self) -> u64 {
        self.drawn.load(Ordering::Relaxed)
    }

    pub fn last_timestamp_us(&self) -> u64 {
        self.last_timestamp_us.load(Ordering::Relaxed)
    }
}

impl RenderSink for NullSink {
    fn draw(&mut self, frame: VideoFrame) -> Result<DrawOutcome, RenderError> {
        self.drawn.fetch_add(1, Ordering::Relaxed);
        self.last_timestamp_us
            .store(frame.timestamp_us().max(0) as u64, Ordering::Relaxed);
        frame.release();
        Ok(DrawOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameLedger, PixelFormat};

    #[test]
    fn null_sink_counts_and_releases() {
        let ledger = FrameLedger::instrumented();
        let sink = NullSink::new();
        let mut boxed: Box<dyn RenderSink> = Box::new(sink.clone());
        let mut f = VideoFrame::new(vec![0; 4], PixelFormat::Rgba8, 1, 1, 42);
        f.track(&ledger);
        assert!(matches!(boxed.draw(f), Ok(DrawOutcome::Done)));
        assert_eq!(sink.drawn(), 1);
        assert_eq!(sink.last_timestamp_us(), 42);
        assert!(ledger.stats().is_balanced());
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |f: VideoFrame| -> Result<(), RenderError> {
                seen.push(f.timestamp_us());
                f.release();
                Ok(())
            };
            sink.draw(VideoFrame::new(vec![], PixelFormat::Rgba8, 0, 0, 7))
                .unwrap();
        }
        assert_eq!(seen, vec![7]);
    }
}
