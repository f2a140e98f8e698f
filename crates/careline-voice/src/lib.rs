//! Voice capture for the Careline composer.
//!
//! Wraps an [`AudioRecorder`] in a [`VoiceCapture`] that tracks the
//! recorder status, the elapsed-seconds counter, and the playback flag for a
//! single voice message.

pub mod capture;
pub mod recorder;
pub mod state;

pub use capture::{format_elapsed, VoiceCapture};
pub use recorder::{AudioRecorder, FileRecorder, MockRecorder};
pub use state::{RecorderStatus, StatusMachine};
