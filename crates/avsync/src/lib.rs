//! Decode, buffer and synchronize media for real-time playback.
//!
//! A [`Player`](player::Player) runs two threads: a decode worker that pulls samples from a
//! [`SampleSource`](source::SampleSource) and feeds frames and audio forward, and a render
//! session that owns the playback clock and presents the frame closest to it. Audio reaches the
//! device callback through a lock-free ring.

pub mod adapter;
pub mod buffer;
pub mod clock;
pub mod codec;
pub mod config;
pub mod decode_queue;
pub mod demux;
pub mod device;
pub mod error;
pub mod events;
pub mod frame;
pub mod output;
pub mod player;
pub mod protocol;
pub mod resample;
pub mod ring;
mod session;
pub mod sink;
pub mod source;
pub mod state;
pub mod status;
pub mod synthetic;
pub mod worker;

pub use adapter::{AdapterError, AdapterOutput, FrameAdapter};
pub use config::PlayerConfig;
pub use error::PlayerError;
pub use events::PlayerEvent;
pub use frame::{FrameLedger, PixelFormat, VideoFrame};
pub use player::{Player, PlayerBuilder};
pub use sink::{DrawOutcome, NullSink, RenderSink};
pub use source::{MediaInput, SampleSource};
