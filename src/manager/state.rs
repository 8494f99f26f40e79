//! Connection state machine gating the serve loop.
//!
//! ```text
//!            play()            pause()
//!   Unset ──────────► Play ◄──────────► Pause
//!                      │    play()        │
//!               stop() │                  │ stop()
//!                      ▼                  ▼
//!                     Stop ◄──────────────┘
//! ```
//!
//! The serve loop calls [`StateHolder::check`] once per iteration and acts on
//! the returned [`LoopDirective`]. Only an explicit `play()` leaves `Stop`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::watch;
use tracing::{debug, warn};

// ============================================================================
// ConnectionState
// ============================================================================

/// Current state of the serve loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never started.
    #[default]
    Unset,
    /// Reading and dispatching.
    Play,
    /// Connected but not reading.
    Pause,
    /// Loop should exit and close the socket.
    Stop,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unset => "unset",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
        };
        f.write_str(name)
    }
}

// ============================================================================
// LoopDirective
// ============================================================================

/// What the serve loop should do this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDirective {
    /// Read and dispatch.
    Proceed,
    /// Sleep, then check again.
    Idle,
    /// Exit and clean up.
    Terminate,
}

// ============================================================================
// StateHolder
// ============================================================================

/// Holds the [`ConnectionState`] and publishes changes to watchers.
#[derive(Debug)]
pub struct StateHolder {
    tx: watch::Sender<ConnectionState>,
}

impl StateHolder {
    /// Creates a holder in [`ConnectionState::Unset`].
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Unset);
        Self { tx }
    }

    /// Switches to [`ConnectionState::Play`].
    pub fn play(&self) {
        self.set(ConnectionState::Play);
    }

    /// Switches to [`ConnectionState::Pause`].
    pub fn pause(&self) {
        self.set(ConnectionState::Pause);
    }

    /// Switches to [`ConnectionState::Stop`].
    pub fn stop(&self) {
        self.set(ConnectionState::Stop);
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Maps the current state to a loop directive.
    #[must_use]
    pub fn check(&self) -> LoopDirective {
        match self.current() {
            ConnectionState::Play => LoopDirective::Proceed,
            ConnectionState::Pause => LoopDirective::Idle,
            ConnectionState::Stop => LoopDirective::Terminate,
            ConnectionState::Unset => {
                warn!("Serve loop checked before play(); terminating");
                LoopDirective::Terminate
            }
        }
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    fn set(&self, state: ConnectionState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }
}

impl Default for StateHolder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_terminates() {
        let holder = StateHolder::new();
        assert_eq!(holder.current(), ConnectionState::Unset);
        assert_eq!(holder.check(), LoopDirective::Terminate);
    }

    #[test]
    fn test_play_proceeds() {
        let holder = StateHolder::new();
        holder.play();
        assert_eq!(holder.check(), LoopDirective::Proceed);
    }

    #[test]
    fn test_pause_idles() {
        let holder = StateHolder::new();
        holder.play();
        holder.pause();
        assert_eq!(holder.check(), LoopDirective::Idle);
    }

    #[test]
    fn test_stop_after_play_terminates() {
        let holder = StateHolder::new();
        holder.play();
        holder.stop();
        assert_eq!(holder.check(), LoopDirective::Terminate);

        holder.play();
        holder.stop();
        assert_eq!(holder.check(), LoopDirective::Terminate);
    }

    #[test]
    fn test_explicit_play_resumes_after_stop() {
        let holder = StateHolder::new();
        holder.stop();
        holder.play();
        assert_eq!(holder.check(), LoopDirective::Proceed);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let holder = StateHolder::new();
        let mut rx = holder.subscribe();

        holder.play();
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Play);

        holder.stop();
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow(), ConnectionState::Stop);
    }
}
