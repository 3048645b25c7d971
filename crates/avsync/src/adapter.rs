//! Optional per-frame transform between selection and drawing.
//!
//! Ownership contract: the adapter receives the frame by value. If it returns the same frame
//! there is nothing to release. If it returns a different frame, releasing the input is its
//! job. On failure it may hand the input back inside the [`AdapterError`] so the pipeline can
//! release it.

use std::sync::Arc;
use std::time::Duration;

use avsync_types::ErrorCode;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use thiserror::Error;

use crate::frame::{FrameLedger, VideoFrame};

#[derive(Error, Debug)]
#[error("{message}")]
pub struct AdapterError {
    pub message: String,
    /// The input frame, when the adapter gives it back.
    pub frame: Option<VideoFrame>,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            frame: None,
        }
    }

    pub fn with_frame(mut self, frame: VideoFrame) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn code(&self) -> ErrorCode {
        ErrorCode::AdapterError
    }
}

pub enum AdapterOutput {
    Ready(VideoFrame),
    /// Result delivered later, e.g. by a GPU readback thread.
    Pending(Receiver<Result<VideoFrame, AdapterError>>),
}

pub trait FrameAdapter: Send {
    fn process(&mut self, frame: VideoFrame) -> Result<AdapterOutput, AdapterError>;
}

impl<F> FrameAdapter for F
where
    F: FnMut(VideoFrame) -> Result<VideoFrame, AdapterError> + Send,
{
    fn process(&mut self, frame: VideoFrame) -> Result<AdapterOutput, AdapterError> {
        self(frame).map(AdapterOutput::Ready)
    }
}

pub struct AdapterPipeline {
    adapter: Option<Box<dyn FrameAdapter>>,
    ledger: Arc<FrameLedger>,
    timeout: Duration,
    failures: u64,
    unreleased_inputs: u64,
}

impl AdapterPipeline {
    pub fn new(ledger: Arc<FrameLedger>, timeout: Duration) -> Self {
        Self {
            adapter: None,
            ledger,
            timeout,
            failures: 0,
            unreleased_inputs: 0,
        }
    }

    /// Swap the adapter; takes effect on the next frame.
    pub fn set(&mut self, adapter: Option<Box<dyn FrameAdapter>>) {
        self.adapter = adapter;
    }

    pub fn is_active(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Times an adapter returned a new frame while still holding its input.
    pub fn unreleased_inputs(&self) -> u64 {
        self.unreleased_inputs
    }

    /// Run the adapter on `frame`. Without an adapter the frame passes through.
    ///
    /// On error every frame the pipeline can reach has been released.
    pub fn apply(&mut self, frame: VideoFrame) -> Result<VideoFrame, AdapterError> {
        let Some(adapter) = self.adapter.as_mut() else {
            return Ok(frame);
        };
        let input = frame.id();

        let result = match adapter.process(frame) {
            Ok(AdapterOutput::Ready(out)) => Ok(out),
            Ok(AdapterOutput::Pending(rx)) => match rx.recv_timeout(self.timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => Err(AdapterError::new(format!(
                    "adapter did not finish within {:?}",
                    self.timeout
                ))),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(AdapterError::new("adapter dropped its pending result"))
                }
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(mut out) => {
                if out.id() != input {
                    out.track(&self.ledger);
                    if self.ledger.is_live(input) {
                        self.unreleased_inputs += 1;
                        tracing::warn!(
                            input = %input,
                            output = %out.id(),
                            "adapter returned a new frame without releasing its input"
                        );
                    }
                }
                Ok(out)
            }
            Err(mut e) => {
                self.failures += 1;
                if let Some(f) = e.frame.take() {
                    f.release();
                }
                tracing::warn!(frame = %input, error = %e.message, "adapter failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFate, PixelFormat};
    use crossbeam_channel::bounded;

    fn tracked(ledger: &Arc<FrameLedger>) -> VideoFrame {
        let mut f = VideoFrame::new(vec![7; 4], PixelFormat::Rgba8, 1, 1, 0);
        f.track(ledger);
        f
    }

    #[test]
    fn passthrough_without_adapter() {
        let ledger = FrameLedger::instrumented();
        let mut pipe = AdapterPipeline::new(ledger.clone(), Duration::from_millis(50));
        let f = tracked(&ledger);
        let id = f.id();
        let out = pipe.apply(f).unwrap();
        assert_eq!(out.id(), id);
        out.release();
        assert!(ledger.stats().is_balanced());
    }

    #[test]
    fn replacing_adapter_hands_over_ownership() {
        let ledger = FrameLedger::instrumented();
        let mut pipe = AdapterPipeline::new(ledger.clone(), Duration::from_millis(50));
        pipe.set(Some(Box::new(|f: VideoFrame| -> Result<VideoFrame, AdapterError> {
            let inverted = f.data().iter().map(|b| 255 - b).collect();
            let out = f.derive(inverted);
            f.release();
            Ok(out)
        })));
        let f = tracked(&ledger);
        let input = f.id();
        let out = pipe.apply(f).unwrap();
        assert_ne!(out.id(), input);
        assert_eq!(out.data()[0], 248);
        assert!(out.is_tracked());
        assert_eq!(ledger.fate(input), Some(FrameFate::Released));
        assert_eq!(pipe.unreleased_inputs(), 0);
        out.release();
        assert!(ledger.stats().is_balanced());
    }

    #[test]
    fn failure_releases_handed_back_frame() {
        let ledger = FrameLedger::instrumented();
        let mut pipe = AdapterPipeline::new(ledger.clone(), Duration::from_millis(50));
        pipe.set(Some(Box::new(|f: VideoFrame| -> Result<VideoFrame, AdapterError> {
            Err(AdapterError::new("shader compile failed").with_frame(f))
        })));
        let f = tracked(&ledger);
        let id = f.id();
        let err = pipe.apply(f).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AdapterError);
        assert!(err.frame.is_none());
        assert_eq!(ledger.fate(id), Some(FrameFate::Released));
        assert_eq!(pipe.failures(), 1);
    }

    #[test]
    fn pending_result_is_awaited() {
        struct Threaded;
        impl FrameAdapter for Threaded {
            fn process(&mut self, frame: VideoFrame) -> Result<AdapterOutput, AdapterError> {
                let (tx, rx) = bounded(1);
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    let _ = tx.send(Ok(frame));
                });
                Ok(AdapterOutput::Pending(rx))
            }
        }
        let ledger = FrameLedger::instrumented();
        let mut pipe = AdapterPipeline::new(ledger.clone(), Duration::from_secs(1));
        pipe.set(Some(Box::new(Threaded)));
        let f = tracked(&ledger);
        let id = f.id();
        let out = pipe.apply(f).unwrap();
        assert_eq!(out.id(), id);
        out.release();
    }

    #[test]
    fn pending_timeout_is_an_error() {
        struct Stuck(Option<crossbeam_channel::Sender<Result<VideoFrame, AdapterError>>>);
        impl FrameAdapter for Stuck {
            fn process(&mut self, frame: VideoFrame) -> Result<AdapterOutput, AdapterError> {
                let (tx, rx) = bounded(1);
                frame.release();
                self.0 = Some(tx);
                Ok(AdapterOutput::Pending(rx))
            }
        }
        let ledger = FrameLedger::new();
        let mut pipe = AdapterPipeline::new(ledger.clone(), Duration::from_millis(10));
        pipe.set(Some(Box::new(Stuck(None))));
        assert!(pipe.apply(tracked(&ledger)).is_err());
        assert!(ledger.stats().is_balanced());
    }

    #[test]
    fn holding_on_to_the_input_is_detected() {
        let ledger = FrameLedger::instrumented();
        let mut pipe = AdapterPipeline::new(ledger.clone(), Duration::from_millis(50));
        let mut kept: Vec<VideoFrame> = Vec::new();
        pipe.set(Some(Box::new(move |f: VideoFrame| -> Result<VideoFrame, AdapterError> {
            let out = f.derive(vec![0; 4]);
            kept.push(f);
            Ok(out)
        })));
        let out = pipe.apply(tracked(&ledger)).unwrap();
        assert_eq!(pipe.unreleased_inputs(), 1);
        out.release();
    }
}
