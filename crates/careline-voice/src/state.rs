//! Recorder state machine with thread-safe transitions.
//!
//! Valid transitions for one voice-input interaction:
//! - Idle -> Recording (start)
//! - Recording -> Paused, Paused -> Recording (pause / resume)
//! - Recording -> Stopped, Paused -> Stopped (stop, clip available)
//! - any non-idle state -> Idle (cancel, or clip taken for sending)

use std::fmt;
use std::sync::{Arc, Mutex};

use careline_core::error::CarelineError;

/// Status of the voice recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecorderStatus {
    /// Nothing recorded. Composer shows the text input.
    Idle,
    /// Microphone open, elapsed counter running.
    Recording,
    /// Microphone open, elapsed counter held.
    Paused,
    /// Clip captured and waiting to be played back, sent, or discarded.
    Stopped,
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderStatus::Idle => write!(f, "Idle"),
            RecorderStatus::Recording => write!(f, "Recording"),
            RecorderStatus::Paused => write!(f, "Paused"),
            RecorderStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

impl RecorderStatus {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &RecorderStatus) -> bool {
        matches!(
            (self, target),
            (RecorderStatus::Idle, RecorderStatus::Recording)
                | (RecorderStatus::Recording, RecorderStatus::Paused)
                | (RecorderStatus::Paused, RecorderStatus::Recording)
                | (RecorderStatus::Recording, RecorderStatus::Stopped)
                | (RecorderStatus::Paused, RecorderStatus::Stopped)
                // Cancel / consume
                | (RecorderStatus::Recording, RecorderStatus::Idle)
                | (RecorderStatus::Paused, RecorderStatus::Idle)
                | (RecorderStatus::Stopped, RecorderStatus::Idle)
        )
    }

    /// Whether the microphone is open.
    pub fn is_capturing(&self) -> bool {
        matches!(self, RecorderStatus::Recording | RecorderStatus::Paused)
    }
}

/// Shared recorder status.
///
/// Clones observe the same state, so the elapsed-time ticker can read it
/// while the owner drives transitions.
#[derive(Debug, Clone)]
pub struct StatusMachine {
    state: Arc<Mutex<RecorderStatus>>,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusMachine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderStatus::Idle)),
        }
    }

    pub fn current(&self) -> RecorderStatus {
        *self.state.lock().expect("recorder status mutex poisoned")
    }

    /// Attempt to transition to the target status.
    pub fn transition(&self, target: RecorderStatus) -> Result<(), CarelineError> {
        let mut state = self.state.lock().expect("recorder status mutex poisoned");
        if state.can_transition_to(&target) {
            tracing::debug!("Recorder status: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(CarelineError::InvalidTransition {
                from: state.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Force the status back to Idle.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("recorder status mutex poisoned");
        if *state != RecorderStatus::Idle {
            tracing::debug!("Recorder status reset to Idle from {}", *state);
        }
        *state = RecorderStatus::Idle;
    }
}
