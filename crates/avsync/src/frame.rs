//! Decoded video frames and their lifetime accounting.
//!
//! A [`VideoFrame`] is move-only: whoever holds it owns it, and [`VideoFrame::release`]
//! consumes it. Dropping a frame without releasing it still frees the pixels, but the
//! [`FrameLedger`] records it as an implicit drop so leaks of ownership discipline are visible
//! in stats and tests.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique frame identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    fn next() -> Self {
        FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pixel layout of a frame's data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    /// Planar 4:2:0, Y then U then V.
    I420,
    /// Semi-planar 4:2:0, Y then interleaved UV.
    Nv12,
}

impl PixelFormat {
    /// Bytes needed for one frame of `width` x `height`.
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => w * h * 4,
            PixelFormat::I420 | PixelFormat::Nv12 => {
                let chroma = w.div_ceil(2) * h.div_ceil(2);
                w * h + chroma * 2
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Bgra8 => "bgra8",
            PixelFormat::I420 => "i420",
            PixelFormat::Nv12 => "nv12",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "rgba8" | "rgba" => Some(PixelFormat::Rgba8),
            "bgra8" | "bgra" => Some(PixelFormat::Bgra8),
            "i420" | "yuv420p" => Some(PixelFormat::I420),
            "nv12" => Some(PixelFormat::Nv12),
            _ => None,
        }
    }
}

/// What happened to a frame, as recorded by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFate {
    /// Still owned by some stage.
    Live,
    /// Released explicitly by its last owner.
    Released,
    /// Dropped without an explicit release.
    Dropped,
}

/// Aggregate frame lifetime counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub created: u64,
    pub released: u64,
    pub dropped: u64,
    pub live: u64,
    /// Settlements for ids that were not live (should stay zero).
    pub anomalies: u64,
}

impl FrameStats {
    /// Every tracked frame has been settled exactly once.
    pub fn is_balanced(&self) -> bool {
        self.live == 0 && self.anomalies == 0 && self.created == self.released + self.dropped
    }
}

/// Per-session accounting of frame lifetimes.
///
/// The live set is always kept (it is bounded by the pipeline depths). The instrumented
/// variant additionally remembers the fate of every settled frame so tests can ask what
/// happened to a particular id.
#[derive(Debug, Default)]
pub struct FrameLedger {
    created: AtomicU64,
    released: AtomicU64,
    dropped: AtomicU64,
    anomalies: AtomicU64,
    live: Mutex<HashSet<FrameId>>,
    history: Option<Mutex<HashMap<FrameId, FrameFate>>>,
}

impl FrameLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ledger that keeps the fate of every frame it has seen.
    pub fn instrumented() -> Arc<Self> {
        Arc::new(Self {
            history: Some(Mutex::new(HashMap::new())),
            ..Self::default()
        })
    }

    fn register(&self, id: FrameId) {
        self.created.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut live) = self.live.lock() {
            live.insert(id);
        }
        if let Some(history) = &self.history {
            if let Ok(mut h) = history.lock() {
                h.insert(id, FrameFate::Live);
            }
        }
    }

    fn settle(&self, id: FrameId, fate: FrameFate) {
        let was_live = self
            .live
            .lock()
            .map(|mut live| live.remove(&id))
            .unwrap_or(false);
        if !was_live {
            self.anomalies.fetch_add(1, Ordering::Relaxed);
            tracing::error!(frame = %id, ?fate, "frame settled twice or never registered");
            return;
        }
        match fate {
            FrameFate::Released => self.released.fetch_add(1, Ordering::Relaxed),
            FrameFate::Dropped => self.dropped.fetch_add(1, Ordering::Relaxed),
            FrameFate::Live => 0,
        };
        if let Some(history) = &self.history {
            if let Ok(mut h) = history.lock() {
                h.insert(id, fate);
            }
        }
    }

    pub fn stats(&self) -> FrameStats {
        let live = self.live.lock().map(|l| l.len() as u64).unwrap_or(0);
        FrameStats {
            created: self.created.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            live,
            anomalies: self.anomalies.load(Ordering::Relaxed),
        }
    }

    pub fn is_live(&self, id: FrameId) -> bool {
        self.live.lock().map(|l| l.contains(&id)).unwrap_or(false)
    }

    /// Fate of `id`. Without instrumentation only live frames are known.
    pub fn fate(&self, id: FrameId) -> Option<FrameFate> {
        if let Some(history) = &self.history {
            return history.lock().ok().and_then(|h| h.get(&id).copied());
        }
        self.is_live(id).then_some(FrameFate::Live)
    }
}

/// A decoded picture with exactly one owner.
pub struct VideoFrame {
    id: FrameId,
    data: Vec<u8>,
    format: PixelFormat,
    width: u32,
    height: u32,
    timestamp_us: i64,
    duration_us: i64,
    ledger: Option<Arc<FrameLedger>>,
    settled: bool,
}

impl VideoFrame {
    pub fn new(
        data: Vec<u8>,
        format: PixelFormat,
        width: u32,
        height: u32,
        timestamp_us: i64,
    ) -> Self {
        Self {
            id: FrameId::next(),
            data,
            format,
            width,
            height,
            timestamp_us,
            duration_us: 0,
            ledger: None,
            settled: false,
        }
    }

    pub fn with_duration(mut self, duration_us: i64) -> Self {
        self.duration_us = duration_us;
        self
    }

    /// New frame with the same geometry and timing but different pixels (and a new id).
    pub fn derive(&self, data: Vec<u8>) -> VideoFrame {
        VideoFrame::new(data, self.format, self.width, self.height, self.timestamp_us)
            .with_duration(self.duration_us)
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Presentation timestamp in microseconds.
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn timestamp_seconds(&self) -> f64 {
        self.timestamp_us as f64 / 1_000_000.0
    }

    pub fn duration_us(&self) -> i64 {
        self.duration_us
    }

    pub fn is_tracked(&self) -> bool {
        self.ledger.is_some()
    }

    /// Register this frame with `ledger`. No-op if it is already tracked.
    pub fn track(&mut self, ledger: &Arc<FrameLedger>) {
        if self.ledger.is_none() && !self.settled {
            ledger.register(self.id);
            self.ledger = Some(ledger.clone());
        }
    }

    /// Give up ownership and free the pixels.
    pub fn release(mut self) {
        self.settle(FrameFate::Released);
    }

    fn settle(&mut self, fate: FrameFate) {
        if self.settled {
            return;
        }
        self.settled = true;
        self.data = Vec::new();
        if let Some(ledger) = self.ledger.take() {
            ledger.settle(self.id, fate);
        }
    }
}

impl Drop for VideoFrame {
    fn drop(&mut self) {
        if !self.settled {
            tracing::trace!(frame = %self.id, "frame dropped without release");
            self.settle(FrameFate::Dropped);
        }
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_us", &self.timestamp_us)
            .field("bytes", &self.data.len())
            .finish()
    }
}
