//! Session state machine: which commands are valid where, and what they lead to.

use avsync_types::PlaybackState;

use crate::error::PlayerError;
use crate::events::{EventBus, PlayerEvent};

/// What a command does from the current state, once it is known to be valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayAction {
    /// Start the clock from the current position.
    Start,
    /// Already playing: nothing to do.
    Noop,
    /// Ended: reopen the retained source, seek to zero, then start.
    Reload,
}

pub fn check_load(state: PlaybackState) -> Result<(), PlayerError> {
    match state {
        PlaybackState::Loading | PlaybackState::Seeking => Err(PlayerError::InvalidState {
            op: "load",
            state,
        }),
        _ => Ok(()),
    }
}

pub fn check_play(state: PlaybackState) -> Result<PlayAction, PlayerError> {
    match state {
        PlaybackState::Ready | PlaybackState::Paused => Ok(PlayAction::Start),
        PlaybackState::Playing => Ok(PlayAction::Noop),
        PlaybackState::Ended => Ok(PlayAction::Reload),
        _ => Err(PlayerError::InvalidState { op: "play", state }),
    }
}

/// `Ok(true)` when the clock has to be frozen; pausing an already still session is a no-op.
pub fn check_pause(state: PlaybackState) -> Result<bool, PlayerError> {
    match state {
        PlaybackState::Playing => Ok(true),
        PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Ended => Ok(false),
        _ => Err(PlayerError::InvalidState { op: "pause", state }),
    }
}

pub fn check_seek(state: PlaybackState) -> Result<(), PlayerError> {
    if state.has_media() {
        Ok(())
    } else {
        Err(PlayerError::InvalidState { op: "seek", state })
    }
}

pub fn check_stop(state: PlaybackState) -> Result<(), PlayerError> {
    if state.has_media() {
        Ok(())
    } else {
        Err(PlayerError::InvalidState { op: "stop", state })
    }
}

/// State a seek resolves to, given the state it started from.
///
/// Ended media is parked at the new position rather than restarted.
pub fn seek_resolution(before: PlaybackState) -> PlaybackState {
    match before {
        PlaybackState::Playing => PlaybackState::Playing,
        PlaybackState::Ready => PlaybackState::Ready,
        _ => PlaybackState::Paused,
    }
}

/// Current state plus change notification.
pub struct SessionState {
    state: PlaybackState,
    events: EventBus,
}

impl SessionState {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: PlaybackState::Idle,
            events,
        }
    }

    pub fn get(&self) -> PlaybackState {
        self.state
    }

    /// Move to `to`, publishing a change event when the state differs.
    pub fn set(&mut self, to: PlaybackState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::debug!(%from, %to, "state change");
        self.events.publish(PlayerEvent::StateChanged { from, to });
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_rules() {
        assert_eq!(check_play(PlaybackState::Ready).unwrap(), PlayAction::Start);
        assert_eq!(check_play(PlaybackState::Paused).unwrap(), PlayAction::Start);
        assert_eq!(check_play(PlaybackState::Playing).unwrap(), PlayAction::Noop);
        assert_eq!(check_play(PlaybackState::Ended).unwrap(), PlayAction::Reload);
        for state in [
            PlaybackState::Idle,
            PlaybackState::Loading,
            PlaybackState::Seeking,
            PlaybackState::Error,
        ] {
            assert!(matches!(
                check_play(state),
                Err(PlayerError::InvalidState { op: "play", .. })
            ));
        }
    }

    #[test]
    fn pause_and_seek_rules() {
        assert!(check_pause(PlaybackState::Playing).unwrap());
        assert!(!check_pause(PlaybackState::Paused).unwrap());
        assert!(check_pause(PlaybackState::Idle).is_err());
        assert!(check_seek(PlaybackState::Ended).is_ok());
        assert!(check_seek(PlaybackState::Seeking).is_ok());
        assert!(check_seek(PlaybackState::Error).is_err());
        assert!(check_stop(PlaybackState::Idle).is_err());
        assert!(check_load(PlaybackState::Error).is_ok());
        assert!(check_load(PlaybackState::Loading).is_err());
    }

    #[test]
    fn seek_resolves_to_pre_seek_status() {
        assert_eq!(seek_resolution(PlaybackState::Playing), PlaybackState::Playing);
        assert_eq!(seek_resolution(PlaybackState::Paused), PlaybackState::Paused);
        assert_eq!(seek_resolution(PlaybackState::Ready), PlaybackState::Ready);
        assert_eq!(seek_resolution(PlaybackState::Ended), PlaybackState::Paused);
    }

    #[test]
    fn set_publishes_only_real_changes() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let mut state = SessionState::new(bus);
        state.set(PlaybackState::Idle);
        state.set(PlaybackState::Loading);
        assert_eq!(
            rx.try_recv().unwrap(),
            PlayerEvent::StateChanged {
                from: PlaybackState::Idle,
                to: PlaybackState::Loading
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
