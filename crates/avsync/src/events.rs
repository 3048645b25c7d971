//! Per-player event subscriptions.
//!
//! A small broadcast registry over crossbeam channels: each subscriber gets its own unbounded
//! receiver, disconnected subscribers are pruned on publish, and `close` disconnects everyone.

use std::sync::{Arc, Mutex};

use avsync_types::{ErrorInfo, MediaInfo, PlaybackState};
use crossbeam_channel::{Receiver, Sender, unbounded};

/// Externally visible changes of a player.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    Loaded(MediaInfo),
    SeekCompleted {
        actual_seconds: f64,
    },
    /// Playback wrapped back to zero with looping enabled.
    Looped,
    Error(ErrorInfo),
}

#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Option<Vec<Sender<PlayerEvent>>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Some(Vec::new()))),
        }
    }

    /// Register a subscriber. After `close` the receiver is returned already disconnected.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut guard) = self.subscribers.lock()
            && let Some(subs) = guard.as_mut()
        {
            subs.push(tx);
        }
        rx
    }

    pub fn publish(&self, event: PlayerEvent) {
        let Ok(mut guard) = self.subscribers.lock() else {
            return;
        };
        if let Some(subs) = guard.as_mut() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    /// Drop every subscriber and refuse new ones.
    pub fn close(&self) {
        if let Ok(mut guard) = self.subscribers.lock() {
            guard.take();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
